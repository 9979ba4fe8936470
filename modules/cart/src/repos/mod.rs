pub mod cart_repo;
