use sea_orm::entity::prelude::*;

use crate::geo::GeoPoint;

/// A cinema and its location. The point is stored as two columns in
/// SRID 4326 degrees; use [`Model::location`] to work with it.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "cinemas")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
}

impl Model {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.longitude, self.latitude)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
