mod surreal_support;

pub mod messaging;
pub mod notification;
pub mod post;
pub mod social_graph;

pub use messaging::*;
pub use notification::*;
pub use post::*;
pub use social_graph::*;
pub use surreal_support::SurrealClient;
