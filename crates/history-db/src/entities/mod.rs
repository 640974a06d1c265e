pub mod request_history;

pub use request_history::Entity as RequestHistory;
