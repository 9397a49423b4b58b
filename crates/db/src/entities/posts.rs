//! `SeaORM` Entity for the posts table.
//!
//! Posts are owned by the publishing subsystem; the media pipeline only ever
//! reads them for existence and ownership checks.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "posts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::post_images::Entity")]
    PostImages,
}

impl Related<super::post_images::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PostImages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
