use anyhow::Result;

use macrolog_core::models::{NewUserGoal, UserGoal, validate_goal};
use macrolog_core::service::MacroService;

use super::helpers::{exit_not_found, resolve_user};

fn print_goals(goal: &UserGoal) {
    let p = goal.protein_goal;
    let c = goal.carbs_goal;
    let f = goal.fat_goal;
    let cal = goal.calories_goal;
    println!("Daily goals: {cal} kcal | P:{p}g C:{c}g F:{f}g");
}

pub(crate) fn cmd_goals_set(
    svc: &MacroService,
    username: &str,
    goal: &NewUserGoal,
    json: bool,
) -> Result<()> {
    validate_goal(goal.protein_goal, goal.carbs_goal, goal.fat_goal)?;
    let user = resolve_user(svc, username, json)?;
    let (saved, _) = svc.db().upsert_user_goals(user.id, goal)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        print_goals(&saved);
    }
    Ok(())
}

pub(crate) fn cmd_goals_show(svc: &MacroService, username: &str, json: bool) -> Result<()> {
    let user = resolve_user(svc, username, json)?;
    let Some(goal) = svc.db().get_user_goals(user.id)? else {
        exit_not_found(
            &format!("No goals set for {username}. Use `macrolog goals set`"),
            json,
        );
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&goal)?);
    } else {
        print_goals(&goal);
    }
    Ok(())
}
