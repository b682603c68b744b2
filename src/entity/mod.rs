//! Active-record style entity mapping.
//!
//! An [`Entity`] declares its identity and its fields; an [`EntityMapper`]
//! turns that declaration into table-name inference, hydration, and the
//! CRUD verbs, running all SQL through a shared [`QueryFacade`].
//!
//! ```ignore
//! #[derive(Debug, Default)]
//! struct User {
//!     id: Option<i64>,
//!     name: String,
//!     email: String,
//! }
//!
//! impl Entity for User {
//!     fn id(&self) -> Option<i64> { self.id }
//!     fn set_id(&mut self, id: Option<i64>) { self.id = id; }
//!     fn fields() -> FieldSet<Self> {
//!         FieldSet::new()
//!             .field("name", |u: &User| &u.name, |u, v| u.name = v)
//!             .field("email", |u: &User| &u.email, |u, v| u.email = v)
//!     }
//! }
//!
//! let mut user = User { name: "Ana".into(), ..Default::default() };
//! mapper.save(&mut user).await?;
//! ```
//!
//! [`QueryFacade`]: crate::db::QueryFacade

pub mod fields;
pub mod inflect;
pub mod mapper;
pub mod naming;

pub use fields::{ColumnValue, FieldSet, ID_FIELD};
pub use mapper::{DEFAULT_CONNECTION, EntityMapper, infer_table_name};

/// A persistable type with a single integer identity column `id`.
pub trait Entity: Default + Send + Sync + 'static {
    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: Option<i64>);

    /// Persistable fields, in column order.
    fn fields() -> FieldSet<Self>;

    /// Name used for table-name inference. Defaults to the Rust type name
    /// without its module path.
    fn type_name() -> &'static str {
        naming::simple_type_name(std::any::type_name::<Self>())
    }

    /// Registered connection this type uses unless overridden on the mapper.
    fn connection_name() -> &'static str {
        DEFAULT_CONNECTION
    }
}
