pub mod calls;
pub mod connection;
pub mod contacts;
pub mod migrations;
#[cfg(test)]
pub mod test_fixtures;
pub mod users;
