mod named_mutex;
mod token;

pub use named_mutex::NamedMutexRegistry;
pub use token::ServerToken;
