pub mod admin_helpers;
pub mod form_helpers;
pub mod media_helpers;
pub mod ownership_helpers;
pub mod pagination;
pub mod public_helpers;
pub mod sanitization_helpers;
