pub mod record;
pub mod routing;
pub mod search;
pub mod transcript;
