pub mod credential_service;
pub mod dispatch_service;
pub mod sender_service;
pub mod tracking_service;
