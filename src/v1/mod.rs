pub mod aws;
pub mod cloud;
pub mod config;
pub mod datastore;
pub mod identity;
pub mod manager;
pub mod resource;
pub mod retry;
pub mod storage;
pub mod tags;
