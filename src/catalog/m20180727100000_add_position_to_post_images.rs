//! Migration: Add position to post images
//! Version: 20180727100000
//! Description: Adds the display order of a post's images

use crate::executor::KeelError;
use crate::migration::{Migration, SchemaManager};
use crate::schema::Column;

pub struct AddPositionToPostImages;

impl Migration for AddPositionToPostImages {
    fn name(&self) -> &str {
        "add_position_to_post_images"
    }

    fn version(&self) -> i64 {
        20180727100000
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.add_column("post_images", Column::integer("position").default(0))
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.drop_column("post_images", "position")
    }
}
