pub mod conversation;
pub mod equipment;
pub mod quotation;
