//! Content store migrations
//!
//! The content store's schema history, oldest first. Units are registered by
//! version, so the order of the list in [`registry`] does not matter, but it
//! is kept chronological to read like the history it is.
//!
//! The last two units were never part of the migration history: the columns
//! they add appeared in the recorded schema dump without a migration behind
//! them. They bring the history back in line with [`recorded_schema`].

mod m20180306153650_create_posts;
mod m20180307194030_create_post_tags;
mod m20180308125140_create_post_images;
mod m20180315211245_create_post_likes;
mod m20180405124532_add_reference_to_post_tags;
mod m20180405135534_create_action_log_histories;
mod m20180612134100_create_post_filters;
mod m20180612135932_create_categories;
mod m20180612142137_add_bukalapak_category_id_to_post_tags;
mod m20180724142646_create_influencers;
mod m20180725130653_add_influencer_id_to_posts;
mod m20180727100000_add_position_to_post_images;
mod m20180727100100_add_post_image_id_to_post_tags;

pub use m20180306153650_create_posts::CreatePosts;
pub use m20180307194030_create_post_tags::CreatePostTags;
pub use m20180308125140_create_post_images::CreatePostImages;
pub use m20180315211245_create_post_likes::CreatePostLikes;
pub use m20180405124532_add_reference_to_post_tags::AddReferenceToPostTags;
pub use m20180405135534_create_action_log_histories::CreateActionLogHistories;
pub use m20180612134100_create_post_filters::CreatePostFilters;
pub use m20180612135932_create_categories::CreateCategories;
pub use m20180612142137_add_bukalapak_category_id_to_post_tags::AddBukalapakCategoryIdToPostTags;
pub use m20180724142646_create_influencers::CreateInfluencers;
pub use m20180725130653_add_influencer_id_to_posts::AddInfluencerIdToPosts;
pub use m20180727100000_add_position_to_post_images::AddPositionToPostImages;
pub use m20180727100100_add_post_image_id_to_post_tags::AddPostImageIdToPostTags;

use crate::migration::{MigrationError, MigrationRegistry, Version};
use crate::schema::{Column, Index, SchemaSnapshot, TableSchema};

/// Every content store unit
pub fn registry() -> Result<MigrationRegistry, MigrationError> {
    MigrationRegistry::new()
        .with(CreatePosts)?
        .with(CreatePostTags)?
        .with(CreatePostImages)?
        .with(CreatePostLikes)?
        .with(AddReferenceToPostTags)?
        .with(CreateActionLogHistories)?
        .with(CreatePostFilters)?
        .with(CreateCategories)?
        .with(AddBukalapakCategoryIdToPostTags)?
        .with(CreateInfluencers)?
        .with(AddInfluencerIdToPosts)?
        .with(AddPositionToPostImages)?
        .with(AddPostImageIdToPostTags)
}

/// The schema dump recorded at version 20180725130653
///
/// Written out by hand from the dump rather than derived from the units, so
/// the two can be checked against each other.
pub fn recorded_schema() -> SchemaSnapshot {
    let mut snapshot = SchemaSnapshot::new();
    snapshot.version = Version::new(20180725130653).ok();

    let mut add = |name: &str, columns: Vec<Column>, indexes: Vec<Index>| {
        let mut indexes = indexes;
        indexes.sort_by(|a, b| a.name.cmp(&b.name));
        let mut all = vec![Column::id()];
        all.extend(columns);
        snapshot
            .tables
            .insert(name.to_string(), TableSchema { columns: all, indexes });
    };
    let timestamps = Column::timestamps;

    add(
        "action_log_histories",
        [
            vec![
                Column::integer("record_id"),
                Column::string("record_type"),
                Column::text("changes"),
                Column::big_integer("actor_id"),
            ],
            timestamps().to_vec(),
        ]
        .concat(),
        vec![Index::new("index_action_log_histories_on_record", ["record_id", "record_type"])],
    );
    add(
        "categories",
        [
            vec![
                Column::integer("bukalapak_category_id").default(0),
                Column::string("bukalapak_category_name"),
                Column::integer("count").default(0),
            ],
            timestamps().to_vec(),
        ]
        .concat(),
        vec![Index::new("index_categories_on_bukalapak_category_id", ["bukalapak_category_id"]).unique()],
    );
    add(
        "influencers",
        [vec![Column::string("name")], timestamps().to_vec()].concat(),
        vec![Index::new("index_influencers_on_name", ["name"])],
    );
    add(
        "post_filters",
        vec![
            Column::integer("post_id"),
            Column::integer("bukalapak_category_id").default(0),
        ],
        vec![Index::new(
            "index_post_filters_on_post_id_and_bukalapak_category_id",
            ["post_id", "bukalapak_category_id"],
        )
        .unique()],
    );
    add(
        "post_images",
        [
            vec![
                Column::integer("post_id"),
                Column::string("url"),
                Column::integer("height"),
                Column::integer("width"),
            ],
            timestamps().to_vec(),
            vec![Column::integer("position").default(0)],
        ]
        .concat(),
        vec![Index::new("index_post_images_on_post_id", ["post_id"])],
    );
    add(
        "post_likes",
        vec![
            Column::integer("post_id"),
            Column::integer("bukalapak_user_id"),
            Column::boolean("liked").default(true),
        ],
        vec![
            Index::new(
                "index_post_likes_on_post_and_user_and_liked",
                ["post_id", "bukalapak_user_id", "liked"],
            ),
            Index::new("index_post_likes_on_post_and_user", ["post_id", "bukalapak_user_id"]).unique(),
        ],
    );
    add(
        "post_tags",
        [
            vec![
                Column::integer("post_id"),
                Column::string("name"),
                Column::string("url"),
                Column::float("coord_x"),
                Column::float("coord_y"),
            ],
            timestamps().to_vec(),
            vec![
                Column::big_integer("reference_id"),
                Column::string("reference_type"),
                Column::integer("bukalapak_category_id").default(0),
                Column::integer("post_image_id"),
            ],
        ]
        .concat(),
        vec![Index::new("index_post_tags_on_post_id", ["post_id"])],
    );
    add(
        "posts",
        [
            vec![
                Column::string("title"),
                Column::text("description"),
                Column::string("influencer_name"),
                Column::boolean("published").default(false),
                Column::date_time("first_published_at"),
                Column::date_time("last_published_at"),
                Column::integer("like_count").default(0),
                Column::boolean("deleted").default(false),
                Column::integer("score").default(0),
            ],
            timestamps().to_vec(),
            vec![Column::integer("influencer_id").default(0)],
        ]
        .concat(),
        vec![
            Index::new("index_posts_on_deleted_and_published", ["deleted", "published"]),
            Index::new(
                "index_posts_on_influencer_id_and_deleted_and_published",
                ["influencer_id", "deleted", "published"],
            ),
        ],
    );

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryDatabase;
    use crate::migration::{Migrator, Target};
    use crate::schema::{diff, SchemaChange};

    fn version(v: i64) -> Version {
        Version::new(v).unwrap()
    }

    #[test]
    fn test_registry_is_chronological() {
        let registry = registry().unwrap();
        assert_eq!(registry.len(), 13);
        assert_eq!(registry.versions().first(), Some(&version(20180306153650)));
        assert_eq!(registry.latest_version(), Some(version(20180727100100)));
    }

    #[test]
    fn test_full_replay_matches_recorded_schema() {
        let database = MemoryDatabase::new();
        let migrator = Migrator::new(registry().unwrap(), &database, &database);
        migrator.apply(Target::Latest).unwrap();

        let regenerated = migrator.regenerate().unwrap();
        assert_eq!(regenerated.tables, recorded_schema().tables);
        assert_eq!(regenerated.version, Some(version(20180727100100)));
    }

    #[test]
    fn test_history_alone_misses_two_columns() {
        let database = MemoryDatabase::new();
        let migrator = Migrator::new(registry().unwrap(), &database, &database);
        migrator
            .apply(Target::Version(version(20180725130653)))
            .unwrap();

        let changes = diff(&migrator.regenerate().unwrap(), &recorded_schema());
        assert_eq!(
            changes,
            vec![
                SchemaChange::AddColumn {
                    table: "post_images".into(),
                    column: Column::integer("position").default(0),
                },
                SchemaChange::AddColumn {
                    table: "post_tags".into(),
                    column: Column::integer("post_image_id"),
                },
            ]
        );
    }

    #[test]
    fn test_every_unit_is_reversible() {
        let database = MemoryDatabase::new();
        let report = Migrator::new(registry().unwrap(), &database, &database)
            .verify()
            .unwrap();
        assert_eq!(report.reversible.len(), 13);
        assert!(report.irreversible.is_empty());
    }
}
