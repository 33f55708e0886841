#![allow(dead_code)]

pub mod line_server;
