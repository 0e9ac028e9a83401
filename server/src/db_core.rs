pub mod prelude {
    pub use entity::newsletter;
    pub use entity::prelude::*;
    pub use sea_orm::{entity::*, query::*, DatabaseConnection, DbErr, PaginatorTrait};
}
