pub mod daemon;
pub mod routes;
