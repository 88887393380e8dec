mod food;
mod helpers;
mod log;
mod models;
mod profile;
mod summary;
mod user;
mod water;
mod weight;

pub(crate) use food::{cmd_food_add, cmd_food_list};
pub(crate) use helpers::active_user;
pub(crate) use log::{cmd_log, cmd_undo};
pub(crate) use models::cmd_models;
pub(crate) use profile::{ProfileUpdate, cmd_goals, cmd_profile_set, cmd_profile_show};
pub(crate) use summary::{cmd_history, cmd_summary};
pub(crate) use user::{cmd_user_add, cmd_user_list};
pub(crate) use water::{cmd_water_add, cmd_water_show};
pub(crate) use weight::{cmd_weight_history, cmd_weight_log};
