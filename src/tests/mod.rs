//! tests/mod.rs
//! Pruebas unitarias e integración (SQLite en memoria + gateway simulado).

mod support;

mod config_tests;
mod gateway_tests;
