//! LibertyPost - a server-rendered publishing site
//!
//! Users register, write articles filed under categories and comment on
//! them; superusers moderate everything from the admin area.

pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod theme;
pub mod web;
