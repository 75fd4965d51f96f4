pub mod types;
pub mod schema;

pub use schema::{build_schema, GraphQLSchema, QueryRoot, MutationRoot};
pub use types::*;
