use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use macrolog_core::models::{Meal, NewMeal, validate_new_meal};
use macrolog_core::service::MacroService;

use super::helpers::{exit_not_found, no_neg_zero, resolve_user, truncate};

fn print_meal_table(meals: &[Meal]) {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Type")]
        meal_type: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
        #[tabled(rename = "")]
        flags: String,
    }

    let rows: Vec<MealRow> = meals
        .iter()
        .map(|m| {
            let mut flags = String::new();
            if m.is_favorite {
                flags.push('★');
            }
            if m.is_ai_generated {
                flags.push_str(" AI");
            }
            MealRow {
                id: m.id,
                name: truncate(&m.name, 35),
                meal_type: m.meal_type.clone(),
                calories: format!("{:.0}", no_neg_zero(m.calories)),
                protein: format!("{:.0}g", no_neg_zero(m.protein)),
                carbs: format!("{:.0}g", no_neg_zero(m.carbs)),
                fat: format!("{:.0}g", no_neg_zero(m.fat)),
                flags: flags.trim().to_string(),
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn cmd_meal_add(
    svc: &MacroService,
    username: &str,
    meal: &NewMeal,
    json: bool,
) -> Result<()> {
    validate_new_meal(meal)?;
    let user = resolve_user(svc, username, json)?;
    let created = svc.db().create_meal(user.id, meal)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&created)?);
    } else {
        let id = created.id;
        let name = &created.name;
        let kind = &created.meal_type;
        let cal = created.calories;
        println!("Added meal {id}: {name} ({kind}) {cal:.0} kcal");
    }
    Ok(())
}

pub(crate) fn cmd_meal_list(
    svc: &MacroService,
    username: &str,
    search: Option<&str>,
    favorites: bool,
    json: bool,
) -> Result<()> {
    let user = resolve_user(svc, username, json)?;
    let mut meals = match search.map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => svc.db().search_meals(user.id, q)?,
        None => svc.db().get_meals_by_user(user.id)?,
    };
    if favorites {
        meals.retain(|m| m.is_favorite);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
        return Ok(());
    }

    if meals.is_empty() {
        eprintln!("No meals found");
        return Ok(());
    }
    print_meal_table(&meals);
    Ok(())
}

pub(crate) fn cmd_meal_favorite(
    svc: &MacroService,
    username: &str,
    meal_id: i64,
    json: bool,
) -> Result<()> {
    let user = resolve_user(svc, username, json)?;
    let Some(meal) = svc.db().toggle_favorite(user.id, meal_id)? else {
        exit_not_found(&format!("Meal {meal_id} not found"), json);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
    } else {
        let name = &meal.name;
        let state = if meal.is_favorite {
            "Marked"
        } else {
            "Unmarked"
        };
        println!("{state} {name} as favorite");
    }
    Ok(())
}

pub(crate) fn cmd_meal_delete(
    svc: &MacroService,
    username: &str,
    meal_id: i64,
    json: bool,
) -> Result<()> {
    let user = resolve_user(svc, username, json)?;
    if !svc.db().delete_meal(user.id, meal_id)? {
        exit_not_found(&format!("Meal {meal_id} not found"), json);
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": meal_id }));
    } else {
        println!("Deleted meal {meal_id}");
    }
    Ok(())
}
