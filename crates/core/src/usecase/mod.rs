pub mod controller;
pub mod encoder;
pub mod poller;
pub mod presentation;
