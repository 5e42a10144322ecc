//! Migration: Create action log histories
//! Version: 20180405135534
//! Description: Creates the audit trail of record changes

use crate::executor::KeelError;
use crate::migration::{Migration, SchemaManager};
use crate::schema::{Column, Index, Table};

pub struct CreateActionLogHistories;

impl Migration for CreateActionLogHistories {
    fn name(&self) -> &str {
        "create_action_log_histories"
    }

    fn version(&self) -> i64 {
        20180405135534
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.create_table(
            Table::new("action_log_histories")
                .column(Column::integer("record_id"))
                .column(Column::string("record_type"))
                .column(Column::text("changes"))
                .column(Column::big_integer("actor_id"))
                .timestamps(),
        )?;
        manager.add_index(
            "action_log_histories",
            Index::new("index_action_log_histories_on_record", ["record_id", "record_type"]),
        )
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), KeelError> {
        manager.drop_table("action_log_histories")
    }
}
