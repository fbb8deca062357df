mod goals;
mod helpers;
mod log;
mod meal;
mod suggest;
mod user;

pub(crate) use goals::{cmd_goals_set, cmd_goals_show};
pub(crate) use log::{cmd_log_add, cmd_log_remove, cmd_log_show, cmd_log_week};
pub(crate) use meal::{cmd_meal_add, cmd_meal_delete, cmd_meal_favorite, cmd_meal_list};
pub(crate) use suggest::{cmd_save_suggestion, cmd_suggest};
pub(crate) use user::cmd_user_add;
