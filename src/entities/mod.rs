pub mod actor;
pub mod cinema;
pub mod genre;
pub mod movie;
pub mod movie_actor;
pub mod movie_genre;
pub mod review;
pub mod role;
pub mod user;
pub mod user_claim;
