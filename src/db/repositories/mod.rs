pub mod accounts;
pub mod assignments;
pub mod bulletins;
pub mod scores;
pub mod uploads;
