pub mod member_roles;
pub mod users;
pub mod world_servers;
