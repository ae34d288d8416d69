pub mod health;
pub mod routes;
