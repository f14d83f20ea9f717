//! Conversions between stored rows and wire shapes.
//!
//! Reads go through `From<Model>`. Creation DTOs become active models through
//! [`IntoActiveModel`], and [`ApplyTo`] writes a DTO over a row that already
//! exists. Photo and poster columns are never touched here; they are set only
//! after the file has been stored.

use sea_orm::{ActiveValue::Set, IntoActiveModel};

use crate::{
    entities::{actor, cinema, genre, movie, movie_actor, movie_genre, review, user},
    geo::GeoPoint,
    models::{
        ActorCreation, ActorDto, ActorPatch, CinemaCreation, CinemaDto, GenreCreation, GenreDto,
        MovieActorCreation, MovieActorDetail, MovieCreation, MovieDetail, MovieDto, ReviewCreation,
        ReviewDto, UserDto,
    },
};

/// Writes the fields of `self` onto an existing active model.
pub trait ApplyTo<A> {
    fn apply_to(self, target: &mut A);
}

// Genres

impl From<genre::Model> for GenreDto {
    fn from(m: genre::Model) -> Self {
        Self { id: m.id, name: m.name }
    }
}

impl IntoActiveModel<genre::ActiveModel> for GenreCreation {
    fn into_active_model(self) -> genre::ActiveModel {
        genre::ActiveModel { name: Set(self.name), ..Default::default() }
    }
}

// Actors

impl From<actor::Model> for ActorDto {
    fn from(m: actor::Model) -> Self {
        Self { id: m.id, name: m.name, birth_date: m.birth_date, photo: m.photo }
    }
}

impl From<actor::Model> for ActorPatch {
    fn from(m: actor::Model) -> Self {
        Self { name: m.name, birth_date: m.birth_date }
    }
}

impl IntoActiveModel<actor::ActiveModel> for ActorCreation {
    fn into_active_model(self) -> actor::ActiveModel {
        actor::ActiveModel {
            name: Set(self.name),
            birth_date: Set(self.birth_date),
            ..Default::default()
        }
    }
}

impl ApplyTo<actor::ActiveModel> for ActorCreation {
    fn apply_to(self, target: &mut actor::ActiveModel) {
        target.name = Set(self.name);
        target.birth_date = Set(self.birth_date);
    }
}

impl ApplyTo<actor::ActiveModel> for ActorPatch {
    fn apply_to(self, target: &mut actor::ActiveModel) {
        target.name = Set(self.name);
        target.birth_date = Set(self.birth_date);
    }
}

// Movies

impl From<movie::Model> for MovieDto {
    fn from(m: movie::Model) -> Self {
        Self {
            id: m.id,
            title: m.title,
            in_theaters: m.in_theaters,
            release_date: m.release_date,
            poster: m.poster,
        }
    }
}

impl ApplyTo<movie::ActiveModel> for &MovieCreation {
    fn apply_to(self, target: &mut movie::ActiveModel) {
        target.title = Set(self.title.clone());
        target.in_theaters = Set(self.in_theaters);
        target.release_date = Set(self.release_date);
    }
}

impl IntoActiveModel<movie::ActiveModel> for &MovieCreation {
    fn into_active_model(self) -> movie::ActiveModel {
        let mut active = movie::ActiveModel::default();
        self.apply_to(&mut active);
        active
    }
}

/// One join row per genre id.
pub fn movie_genres(movie_id: i32, genre_ids: &[i32]) -> Vec<movie_genre::ActiveModel> {
    genre_ids
        .iter()
        .map(|&genre_id| movie_genre::ActiveModel { movie_id: Set(movie_id), genre_id: Set(genre_id) })
        .collect()
}

/// One join row per cast entry, ranked by its position in the list.
pub fn movie_actors(movie_id: i32, actors: &[MovieActorCreation]) -> Vec<movie_actor::ActiveModel> {
    actors
        .iter()
        .zip(0..)
        .map(|(a, sort_order)| movie_actor::ActiveModel {
            movie_id: Set(movie_id),
            actor_id: Set(a.actor_id),
            character: Set(a.character.clone()),
            sort_order: Set(sort_order),
        })
        .collect()
}

impl MovieDetail {
    /// Flattens the join rows of `movie`. Rows are expected in display order;
    /// rows whose target has vanished are skipped.
    pub fn from_parts(
        movie: movie::Model,
        genres: Vec<(movie_genre::Model, Option<genre::Model>)>,
        actors: Vec<(movie_actor::Model, Option<actor::Model>)>,
    ) -> Self {
        let genres = genres.into_iter().filter_map(|(_, g)| g.map(GenreDto::from)).collect();

        let mut actors: Vec<_> = actors
            .into_iter()
            .filter_map(|(link, a)| a.map(|a| (link, a)))
            .collect();
        actors.sort_by_key(|(link, _)| link.sort_order);

        Self {
            movie: movie.into(),
            genres,
            actors: actors
                .into_iter()
                .map(|(link, a)| MovieActorDetail {
                    actor_id: link.actor_id,
                    person_name: a.name,
                    character: link.character,
                })
                .collect(),
        }
    }
}

// Cinemas

impl From<cinema::Model> for CinemaDto {
    fn from(m: cinema::Model) -> Self {
        let location = m.location();
        Self { id: m.id, name: m.name, latitude: location.latitude(), longitude: location.longitude() }
    }
}

impl CinemaCreation {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.longitude, self.latitude)
    }
}

impl IntoActiveModel<cinema::ActiveModel> for CinemaCreation {
    fn into_active_model(self) -> cinema::ActiveModel {
        let location = self.location();
        cinema::ActiveModel {
            name: Set(self.name),
            longitude: Set(location.x),
            latitude: Set(location.y),
            ..Default::default()
        }
    }
}

// Reviews

impl From<(review::Model, Option<user::Model>)> for ReviewDto {
    fn from((m, author): (review::Model, Option<user::Model>)) -> Self {
        Self {
            id: m.id,
            movie_id: m.movie_id,
            user_id: m.user_id,
            user_name: author.map(|u| u.email).unwrap_or_default(),
            rating: m.rating,
            comment: m.comment,
        }
    }
}

impl ApplyTo<review::ActiveModel> for ReviewCreation {
    fn apply_to(self, target: &mut review::ActiveModel) {
        target.rating = Set(self.rating);
        target.comment = Set(self.comment);
    }
}

// Users

impl From<user::Model> for UserDto {
    fn from(m: user::Model) -> Self {
        Self { id: m.id, email: m.email }
    }
}
