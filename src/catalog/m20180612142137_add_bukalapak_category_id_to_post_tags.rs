//! Migration: Add bukalapak category id to post tags
//! Version: 20180612142137
//! Description: Adds the category a tag belongs to

use crate::executor::KeelError;
use crate::migration::{Migration, SchemaManager};
use crate::schema::Column;

pub struct AddBukalapakCategoryIdToPostTags;

impl Migration for AddBukalapakCategoryIdToPostTags {
    fn name(&self) -> &str {
        "add_bukalapak_category_id_to_post_tags"
    }

    fn version(&self) -> i64 {
        20180612142137
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.add_column("post_tags", Column::integer("bukalapak_category_id").default(0))
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.drop_column("post_tags", "bukalapak_category_id")
    }
}
