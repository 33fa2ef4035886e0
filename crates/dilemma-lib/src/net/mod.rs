pub use connection::{ClientStream, Connection};

mod connection;
