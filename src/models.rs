use chrono::{DateTime, NaiveDate, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreDto {
    pub id: i32,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct GenreCreation {
    #[garde(length(chars, min = 1, max = 50))]
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorDto {
    pub id: i32,
    pub name: String,
    pub birth_date: NaiveDate,
    pub photo: Option<String>,
}

/// Text fields of the actor form. The photo travels as a separate multipart part.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ActorCreation {
    #[garde(length(chars, min = 1, max = 120))]
    pub name: String,
    #[garde(skip)]
    pub birth_date: NaiveDate,
}

/// The patchable projection of an actor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ActorPatch {
    #[garde(length(chars, min = 1, max = 120))]
    pub name: String,
    #[garde(skip)]
    pub birth_date: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieDto {
    pub id: i32,
    pub title: String,
    pub in_theaters: bool,
    pub release_date: NaiveDate,
    pub poster: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MovieActorCreation {
    #[garde(range(min = 1))]
    pub actor_id: i32,
    #[garde(length(chars, max = 120))]
    pub character: String,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MovieCreation {
    #[garde(length(chars, min = 1, max = 300))]
    pub title: String,
    #[serde(default)]
    #[garde(skip)]
    pub in_theaters: bool,
    #[garde(skip)]
    pub release_date: NaiveDate,
    #[serde(default)]
    #[garde(skip)]
    pub genre_ids: Vec<i32>,
    #[serde(default)]
    #[garde(dive)]
    pub actors: Vec<MovieActorCreation>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieActorDetail {
    pub actor_id: i32,
    pub person_name: String,
    pub character: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieDetail {
    #[serde(flatten)]
    pub movie: MovieDto,
    pub genres: Vec<GenreDto>,
    pub actors: Vec<MovieActorDetail>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoviesLanding {
    pub upcoming: Vec<MovieDto>,
    pub in_theaters: Vec<MovieDto>,
}

/// Query parameters of the movie search. Pagination is read separately.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MovieFilter {
    pub title: Option<String>,
    pub in_theaters: bool,
    pub upcoming: bool,
    pub genre_id: Option<i32>,
    pub sort_field: Option<String>,
    pub sort_ascending: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CinemaDto {
    pub id: i32,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CinemaCreation {
    #[garde(length(chars, min = 1, max = 120))]
    pub name: String,
    #[garde(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[garde(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDto {
    pub id: i32,
    pub movie_id: i32,
    pub user_id: String,
    pub user_name: String,
    pub rating: i32,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReviewCreation {
    #[garde(range(min = 1, max = 5))]
    pub rating: i32,
    #[garde(length(chars, max = 2000))]
    pub comment: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct UserCredentials {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 6, max = 128))]
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDto {
    pub id: String,
    pub email: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub expiration: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RoleEdit {
    #[garde(length(min = 1))]
    pub user_id: String,
    #[garde(length(chars, min = 1, max = 50))]
    pub role_name: String,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AdminEdit {
    #[garde(email)]
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movie_creation_validates_nested_actors() {
        let dto: MovieCreation = serde_json::from_value(serde_json::json!({
            "title": "Pelicula",
            "releaseDate": "2024-05-01",
            "actors": [{ "actorId": 0, "character": "Lead" }]
        }))
        .unwrap();

        let report = dto.validate().unwrap_err();
        let fields: Vec<String> = report.iter().map(|(path, _)| path.to_string()).collect();
        assert_eq!(fields.len(), 1);
        assert!(fields[0].starts_with("actors") && fields[0].ends_with("actor_id"), "{fields:?}");
        assert!(!dto.in_theaters);
        assert!(dto.genre_ids.is_empty());
    }

    #[test]
    fn movie_filter_defaults_to_no_constraints() {
        let filter: MovieFilter = serde_json::from_str("{}").unwrap();
        assert!(filter.title.is_none());
        assert!(!filter.in_theaters);
        assert!(!filter.upcoming);
        assert!(filter.sort_ascending.is_none());
    }

    #[test]
    fn detail_flattens_movie_fields() {
        let detail = MovieDetail {
            movie: MovieDto {
                id: 3,
                title: "Pelicula".into(),
                in_theaters: true,
                release_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                poster: None,
            },
            genres: vec![],
            actors: vec![],
        };

        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["inTheaters"], true);
        assert_eq!(json["releaseDate"], "2024-01-02");
    }
}
