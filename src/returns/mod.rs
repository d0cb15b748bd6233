pub mod client;
pub mod fields;
pub mod model;
pub mod sanitize;
pub mod vocab;
