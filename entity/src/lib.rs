pub mod prelude;

pub mod newsletter;
