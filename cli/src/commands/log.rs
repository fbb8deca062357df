use anyhow::{Result, bail};
use std::collections::HashMap;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use macrolog_core::service::{MAX_STATS_DAYS, MacroService};

use super::helpers::{
    exit_not_found, no_neg_zero, parse_date, parse_time, resolve_user, truncate,
};

pub(crate) fn cmd_log_show(
    svc: &MacroService,
    username: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Meal")]
        name: String,
        #[tabled(rename = "Servings")]
        servings: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
    }

    let user = resolve_user(svc, username, json)?;
    let date = parse_date(date)?;
    let log = svc.db().get_daily_log(user.id, date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&log)?);
        return Ok(());
    }

    let Some(log) = log.filter(|l| !l.meal_entries.is_empty()) else {
        exit_not_found(&format!("No entries for {date}"), json);
    };

    let names: HashMap<i64, String> = svc
        .db()
        .get_meals_by_user(user.id)?
        .into_iter()
        .map(|m| (m.id, m.name))
        .collect();

    let rows: Vec<EntryRow> = log
        .meal_entries
        .iter()
        .enumerate()
        .map(|(i, e)| EntryRow {
            idx: i,
            time: e.time.clone(),
            name: names
                .get(&e.meal_id)
                .map_or_else(|| format!("(meal {})", e.meal_id), |n| truncate(n, 30)),
            servings: format!("{}", e.servings),
            calories: format!("{:.0}", no_neg_zero(e.calories)),
            protein: format!("{:.0}g", no_neg_zero(e.protein)),
            carbs: format!("{:.0}g", no_neg_zero(e.carbs)),
            fat: format!("{:.0}g", no_neg_zero(e.fat)),
        })
        .collect();

    println!("=== {} ===\n", log.date);
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    let cal = log.total_calories;
    let p = log.total_protein;
    let c = log.total_carbs;
    let f = log.total_fat;
    println!("\n  TOTAL: {cal:.0} kcal | P:{p:.0}g C:{c:.0}g F:{f:.0}g");

    let progress = svc.goal_progress(user.id, date)?;
    if let Some(goal) = &progress.goals {
        let gcal = goal.calories_goal;
        let (gp, gc, gf) = (goal.protein_goal, goal.carbs_goal, goal.fat_goal);
        println!("  GOAL: {gcal} kcal | P:{gp}g C:{gc}g F:{gf}g");
        let r = progress.remaining;
        println!(
            "  REMAINING: {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g",
            r.calories, r.protein, r.carbs, r.fat
        );
        let pct = progress.percent;
        println!(
            "  PROGRESS: {}% kcal | P:{}% C:{}% F:{}%",
            pct.calories, pct.protein, pct.carbs, pct.fat
        );
    }

    Ok(())
}

pub(crate) fn cmd_log_add(
    svc: &MacroService,
    username: &str,
    meal_id: i64,
    date: Option<String>,
    time: Option<String>,
    servings: f64,
    json: bool,
) -> Result<()> {
    if !servings.is_finite() || servings <= 0.0 {
        bail!("Servings must be greater than 0");
    }
    let user = resolve_user(svc, username, json)?;
    let date = parse_date(date)?;
    let time = parse_time(time)?;

    let Some(log) = svc.log_meal(user.id, meal_id, date, &time, servings)? else {
        exit_not_found(&format!("Meal {meal_id} not found"), json);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&log)?);
    } else {
        let cal = log.total_calories;
        let count = log.meal_entries.len();
        println!(
            "Logged meal {meal_id} x{servings} at {time} on {date}. \
             Day total: {cal:.0} kcal ({count} entries)"
        );
    }
    Ok(())
}

pub(crate) fn cmd_log_remove(
    svc: &MacroService,
    username: &str,
    date: Option<String>,
    index: usize,
    json: bool,
) -> Result<()> {
    let user = resolve_user(svc, username, json)?;
    let date = parse_date(date)?;

    let Some(log) = svc.unlog_meal(user.id, date, index)? else {
        exit_not_found(&format!("No entry {index} on {date}"), json);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&log)?);
    } else {
        let cal = log.total_calories;
        println!("Removed entry {index} from {date}. Day total: {cal:.0} kcal");
    }
    Ok(())
}

pub(crate) fn cmd_log_week(
    svc: &MacroService,
    username: &str,
    end: Option<String>,
    days: u32,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct DayRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
    }

    if days == 0 || days > MAX_STATS_DAYS {
        bail!("Days must be between 1 and {MAX_STATS_DAYS}");
    }
    let user = resolve_user(svc, username, json)?;
    let end = parse_date(end)?;
    let stats = svc.weekly_stats(user.id, end, days)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    if stats.logged_days == 0 {
        exit_not_found(&format!("No entries in the last {days} days"), json);
    }

    let rows: Vec<DayRow> = stats
        .days
        .iter()
        .map(|d| {
            let t = d.totals;
            DayRow {
                date: d.date.clone(),
                calories: if d.logged {
                    format!("{:.0}", no_neg_zero(t.calories))
                } else {
                    "-".to_string()
                },
                protein: format!("{:.0}g", no_neg_zero(t.protein)),
                carbs: format!("{:.0}g", no_neg_zero(t.carbs)),
                fat: format!("{:.0}g", no_neg_zero(t.fat)),
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    let avg = stats.average;
    let logged = stats.logged_days;
    println!(
        "\n  AVERAGE ({logged} logged days): {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g",
        avg.calories, avg.protein, avg.carbs, avg.fat
    );
    if let Some(goal) = stats.calorie_goal {
        let total = stats.total_calories;
        let pct = stats.goal_percent;
        println!("  RANGE: {total:.0} / {goal:.0} kcal ({pct}%)");
    }

    Ok(())
}
