mod versioned_schema;

pub use versioned_schema::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, UniqueIndex, VersionedSchema,
    BASE_DB_VERSION, DEFAULT_TIMESTAMP,
};
