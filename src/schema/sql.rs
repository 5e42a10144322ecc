//! PostgreSQL DDL for schema changes, built with `sea-query`

use super::{Column, ColumnType, DefaultValue, SchemaChange};
use sea_query::{Alias, ColumnDef, Index, PostgresQueryBuilder, Table};

/// Render one change as a single PostgreSQL statement
pub fn change_to_sql(change: &SchemaChange) -> String {
    match change {
        SchemaChange::CreateTable { table } => {
            let mut statement = Table::create();
            statement.table(Alias::new(&table.name));
            for column in &table.columns {
                statement.col(column_def(column));
            }
            statement.build(PostgresQueryBuilder)
        }
        SchemaChange::DropTable { table } => Table::drop()
            .table(Alias::new(table))
            .build(PostgresQueryBuilder),
        SchemaChange::AddColumn { table, column } => Table::alter()
            .table(Alias::new(table))
            .add_column(column_def(column))
            .build(PostgresQueryBuilder),
        SchemaChange::DropColumn { table, column } => Table::alter()
            .table(Alias::new(table))
            .drop_column(Alias::new(column))
            .build(PostgresQueryBuilder),
        SchemaChange::AddIndex { table, index } => {
            let mut statement = Index::create();
            statement.name(&index.name).table(Alias::new(table));
            for column in &index.columns {
                statement.col(Alias::new(column));
            }
            if index.unique {
                statement.unique();
            }
            statement.build(PostgresQueryBuilder)
        }
        // PostgreSQL index names are schema-wide, the table is not part of the statement
        SchemaChange::DropIndex { index, .. } => Index::drop()
            .name(index)
            .build(PostgresQueryBuilder),
    }
}

fn column_def(column: &Column) -> ColumnDef {
    let mut def = ColumnDef::new(Alias::new(&column.name));
    match column.column_type {
        ColumnType::String => def.string(),
        ColumnType::Text => def.text(),
        ColumnType::Integer => def.integer(),
        ColumnType::BigInteger => def.big_integer(),
        ColumnType::Float => def.float(),
        ColumnType::Boolean => def.boolean(),
        ColumnType::DateTime => def.date_time(),
    };
    if column.primary_key {
        def.primary_key().auto_increment();
    }
    if !column.nullable {
        def.not_null();
    }
    match &column.default {
        Some(DefaultValue::Bool(value)) => {
            def.default(*value);
        }
        Some(DefaultValue::Int(value)) => {
            def.default(*value);
        }
        Some(DefaultValue::Text(value)) => {
            def.default(value.clone());
        }
        None => {}
    }
    def
}
