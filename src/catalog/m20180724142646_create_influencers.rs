//! Migration: Create influencers
//! Version: 20180724142646
//! Description: Creates influencers

use crate::executor::KeelError;
use crate::migration::{Migration, SchemaManager};
use crate::schema::{Column, Index, Table};

pub struct CreateInfluencers;

impl Migration for CreateInfluencers {
    fn name(&self) -> &str {
        "create_influencers"
    }

    fn version(&self) -> i64 {
        20180724142646
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.create_table(
            Table::new("influencers")
                .column(Column::string("name"))
                .timestamps(),
        )?;
        manager.add_index("influencers", Index::on("influencers", ["name"]))
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.drop_table("influencers")
    }
}
