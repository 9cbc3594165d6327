pub mod list;
pub mod reconcile;
pub mod show;
pub mod update;
