pub mod chat;
pub mod db;
pub mod interpret;
pub mod issue;
pub mod macro_calc;
pub mod merge;
pub mod models;
pub mod reconcile;
pub mod remote;
pub mod session;
pub mod sync;

#[cfg(test)]
mod testing;
