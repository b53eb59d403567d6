pub mod controller;
pub mod gate;
pub mod model;
pub mod service;
pub mod store;
pub mod withdrawal;
