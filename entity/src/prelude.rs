pub use super::newsletter::Entity as Newsletter;
