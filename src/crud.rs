//! CRUD operations shared by every resource keyed by an integer id.

use std::marker::PhantomData;

use garde::Validate;
use json_patch::Patch;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, DatabaseConnection, DbErr, EntityName, EntityTrait, IntoActiveModel,
    Iterable, PaginatorTrait, PrimaryKeyToColumn, PrimaryKeyTrait, Select,
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    entities::{actor, cinema, genre, movie},
    error::{AppError, AppResult},
    mapping::ApplyTo,
    pagination::{Page, Pagination, paginate},
};

/// A stored row addressed by a single integer id.
pub trait HasId {
    fn id(&self) -> i32;
}

macro_rules! has_id {
    ($($module:ident),+) => {
        $(impl HasId for $module::Model {
            fn id(&self) -> i32 {
                self.id
            }
        })+
    };
}

has_id!(actor, cinema, genre, movie);

type Entity<A> = <A as ActiveModelTrait>::Entity;
type Model<A> = <Entity<A> as EntityTrait>::Model;

/// Generic data access for the entity behind active model `A`.
pub struct Crud<'db, A> {
    db: &'db DatabaseConnection,
    _active: PhantomData<A>,
}

impl<'db, A> Crud<'db, A>
where
    A: ActiveModelTrait + ActiveModelBehavior + Send,
    Model<A>: HasId + IntoActiveModel<A> + Sync,
    <<Entity<A> as EntityTrait>::PrimaryKey as PrimaryKeyTrait>::ValueType: From<i32>,
{
    pub fn new(db: &'db DatabaseConnection) -> Self {
        Self { db, _active: PhantomData }
    }

    pub async fn list<D: From<Model<A>>>(&self) -> AppResult<Vec<D>> {
        let rows = Entity::<A>::find().all(self.db).await?;
        Ok(rows.into_iter().map(D::from).collect())
    }

    pub async fn list_paged<D: From<Model<A>>>(
        &self,
        select: Select<Entity<A>>,
        pagination: Pagination,
    ) -> AppResult<Page<D>> {
        let (rows, total) = paginate(self.db, select, pagination).await?;
        Ok(Page { items: rows, total }.map(D::from))
    }

    pub async fn find(&self, id: i32) -> AppResult<Option<Model<A>>> {
        Ok(Entity::<A>::find_by_id(id).one(self.db).await?)
    }

    pub async fn get<D: From<Model<A>>>(&self, id: i32) -> AppResult<D> {
        self.find(id).await?.map(D::from).ok_or(AppError::NotFound)
    }

    pub async fn exists(&self, id: i32) -> AppResult<bool> {
        Ok(Entity::<A>::find_by_id(id).count(self.db).await? > 0)
    }

    /// Validates and inserts `dto`, returning the new id with the stored row mapped to `D`.
    pub async fn create<C, D>(&self, dto: C) -> AppResult<(i32, D)>
    where
        C: Validate<Context = ()> + IntoActiveModel<A>,
        D: From<Model<A>>,
    {
        dto.validate()?;
        let model = dto.into_active_model().insert(self.db).await?;
        let id = model.id();
        debug!(table = %Entity::<A>::default().table_name(), id, "created");
        Ok((id, D::from(model)))
    }

    /// Replaces every column mapped by `dto` on row `id`. Nothing is read back
    /// from the stored row first, so fields the DTO lacks are not preserved.
    pub async fn update<U>(&self, id: i32, dto: U) -> AppResult<()>
    where
        U: Validate<Context = ()> + IntoActiveModel<A>,
    {
        dto.validate()?;
        let mut active = dto.into_active_model();
        for key in <Entity<A> as EntityTrait>::PrimaryKey::iter() {
            active.set(key.into_column(), id.into());
        }

        match active.update(self.db).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(AppError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    /// Applies an RFC 6902 document to the `P` projection of row `id` and
    /// persists the result once it validates.
    pub async fn patch<P>(&self, id: i32, document: Option<Patch>) -> AppResult<()>
    where
        P: From<Model<A>> + Serialize + DeserializeOwned + Validate<Context = ()> + ApplyTo<A>,
    {
        let document = document.ok_or_else(|| AppError::bad_request("patch document is required"))?;
        let model = self.find(id).await?.ok_or(AppError::NotFound)?;

        let mut target = serde_json::to_value(P::from(model.clone()))?;
        json_patch::patch(&mut target, &document.0)
            .map_err(|err| AppError::invalid("patch", err.to_string()))?;
        let patched: P = serde_json::from_value(target)
            .map_err(|err| AppError::invalid("patch", err.to_string()))?;
        patched.validate()?;

        let mut active = model.into_active_model();
        patched.apply_to(&mut active);
        active.update(self.db).await?;
        Ok(())
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        if !self.exists(id).await? {
            return Err(AppError::NotFound);
        }
        Entity::<A>::delete_by_id(id).exec(self.db).await?;
        debug!(table = %Entity::<A>::default().table_name(), id, "deleted");
        Ok(())
    }
}
