//! Migration: Add reference to post tags
//! Version: 20180405124532
//! Description: Lets a tag point at an arbitrary record

use crate::executor::KeelError;
use crate::migration::{Migration, SchemaManager};
use crate::schema::Column;

pub struct AddReferenceToPostTags;

impl Migration for AddReferenceToPostTags {
    fn name(&self) -> &str {
        "add_reference_to_post_tags"
    }

    fn version(&self) -> i64 {
        20180405124532
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.add_column("post_tags", Column::big_integer("reference_id"))?;
        manager.add_column("post_tags", Column::string("reference_type"))
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.drop_column("post_tags", "reference_id")?;
        manager.drop_column("post_tags", "reference_type")
    }
}
