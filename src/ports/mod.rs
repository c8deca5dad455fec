pub mod catalog;
pub mod directory;
pub mod ledger;
pub mod messaging;
pub mod settings;
