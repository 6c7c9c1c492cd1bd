pub mod connect;
pub mod controller;
pub mod sdk;
