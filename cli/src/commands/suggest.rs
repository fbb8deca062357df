use anyhow::{Result, bail};

use crate::llm::{MealGenerator, generate_meal};
use macrolog_core::models::{MacroNeeds, validate_macro_needs};
use macrolog_core::service::{MacroService, SaveAiMeal};

use super::helpers::{exit_not_found, resolve_user};

/// Generate a meal idea and store it as an AI request, optionally saving it
/// straight into the user's meals.
pub(crate) async fn cmd_suggest(
    svc: &MacroService,
    username: &str,
    generators: &[Box<dyn MealGenerator>],
    prompt: &str,
    needs: Option<MacroNeeds>,
    save: bool,
    json: bool,
) -> Result<()> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        bail!("Prompt must not be empty");
    }
    if let Some(needs) = &needs {
        validate_macro_needs(needs)?;
    }
    let user = resolve_user(svc, username, json)?;

    let (result, provider) = generate_meal(generators, prompt, needs.as_ref()).await;
    let request = svc.record_ai_meal(user.id, prompt, &result, provider)?;

    let saved_meal = if save {
        match svc.save_ai_meal(user.id, request.id)? {
            SaveAiMeal::Saved(meal) => Some(meal),
            SaveAiMeal::NotFound | SaveAiMeal::AlreadySaved | SaveAiMeal::NoResult => {
                bail!("Could not save AI meal request {}", request.id)
            }
        }
    } else {
        None
    };

    if json {
        let value = serde_json::json!({ "request": request, "meal": saved_meal });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let name = &result.name;
    let source = provider.as_str();
    println!("{name} ({}, via {source})", result.meal_type);
    if !result.description.is_empty() {
        println!("  {}", result.description);
    }
    if !result.ingredients.is_empty() {
        println!("\n  Ingredients:");
        for ingredient in &result.ingredients {
            println!("    - {ingredient}");
        }
    }
    println!(
        "\n  {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g",
        result.calories, result.protein, result.carbs, result.fat
    );

    match saved_meal {
        Some(meal) => println!("\nSaved as meal {}", meal.id),
        None => println!(
            "\nStored as request {}. Keep it with `macrolog meal from-ai {}`",
            request.id, request.id
        ),
    }
    Ok(())
}

pub(crate) fn cmd_save_suggestion(
    svc: &MacroService,
    username: &str,
    request_id: i64,
    json: bool,
) -> Result<()> {
    let user = resolve_user(svc, username, json)?;
    let meal = match svc.save_ai_meal(user.id, request_id)? {
        SaveAiMeal::Saved(meal) => meal,
        SaveAiMeal::NotFound => {
            exit_not_found(&format!("AI meal request {request_id} not found"), json)
        }
        SaveAiMeal::AlreadySaved => bail!("AI meal request {request_id} is already saved"),
        SaveAiMeal::NoResult => bail!("AI meal request {request_id} has no result to save"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
    } else {
        println!("Saved {} as meal {}", meal.name, meal.id);
    }
    Ok(())
}
