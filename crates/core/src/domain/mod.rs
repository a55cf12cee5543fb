pub mod listing;
pub mod recommendation;
pub mod rule;
