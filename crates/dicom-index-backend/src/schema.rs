//! Index schema.
//!
//! One portable layout, rendered with the column types of each dialect.
//! [`install`] creates it on a database that does not have a `Resources`
//! table yet.

use dicom_index_sql::{Dialect, Dictionary, DICOM_IDENTIFIERS_TABLE, MAIN_DICOM_TAGS_TABLE};
use tracing::{debug, info};

use crate::error::BackendResult;
use crate::manager::DatabaseManager;

/// Version of the layout produced by [`schema_sql`].
pub const SCHEMA_VERSION: i64 = 1;

/// Global property holding the schema version.
pub const GLOBAL_PROPERTY_SCHEMA_VERSION: i32 = 1;

struct ColumnTypes {
    serial_key: &'static str,
    bigint: &'static str,
    indexed_text: &'static str,
    text: &'static str,
}

fn column_types(dialect: Dialect) -> ColumnTypes {
    match dialect {
        Dialect::PostgreSQL => ColumnTypes {
            serial_key: "BIGSERIAL PRIMARY KEY",
            bigint: "BIGINT",
            indexed_text: "TEXT",
            text: "TEXT",
        },
        Dialect::MySQL => ColumnTypes {
            serial_key: "BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY",
            bigint: "BIGINT",
            indexed_text: "VARCHAR(255)",
            text: "LONGTEXT",
        },
        Dialect::SQLite => ColumnTypes {
            serial_key: "INTEGER PRIMARY KEY AUTOINCREMENT",
            bigint: "INTEGER",
            indexed_text: "TEXT",
            text: "TEXT",
        },
        Dialect::MSSQL => ColumnTypes {
            serial_key: "BIGINT IDENTITY(1,1) PRIMARY KEY",
            bigint: "BIGINT",
            indexed_text: "NVARCHAR(255)",
            text: "NVARCHAR(MAX)",
        },
    }
}

/// DDL creating the index schema for `dialect`.
///
/// Attribute tables cascade on resource deletion. The `parentId`
/// self-reference does not, since SQL Server rejects cyclic cascades;
/// descendants are deleted explicitly.
pub fn schema_sql(dialect: Dialect) -> String {
    let t = column_types(dialect);
    let owner = format!(
        "id {} NOT NULL REFERENCES Resources(internalId) ON DELETE CASCADE",
        t.bigint
    );

    let statements = [
        format!(
            "CREATE TABLE GlobalProperties(property INTEGER PRIMARY KEY, value {})",
            t.text
        ),
        format!(
            "CREATE TABLE Resources(internalId {}, resourceType INTEGER NOT NULL, publicId {} NOT NULL, parentId {} REFERENCES Resources(internalId))",
            t.serial_key, t.indexed_text, t.bigint
        ),
        format!(
            "CREATE TABLE {}({}, tagGroup INTEGER NOT NULL, tagElement INTEGER NOT NULL, value {}, PRIMARY KEY(id, tagGroup, tagElement))",
            MAIN_DICOM_TAGS_TABLE, owner, t.text
        ),
        format!(
            "CREATE TABLE {}({}, tagGroup INTEGER NOT NULL, tagElement INTEGER NOT NULL, value {}, PRIMARY KEY(id, tagGroup, tagElement))",
            DICOM_IDENTIFIERS_TABLE, owner, t.indexed_text
        ),
        format!(
            "CREATE TABLE Metadata({}, type INTEGER NOT NULL, value {}, revision INTEGER, PRIMARY KEY(id, type))",
            owner, t.text
        ),
        format!(
            "CREATE TABLE AttachedFiles({}, fileType INTEGER NOT NULL, uuid {} NOT NULL, compressedSize {}, uncompressedSize {}, compressionType INTEGER, uncompressedHash {}, compressedHash {}, revision INTEGER, PRIMARY KEY(id, fileType))",
            owner, t.indexed_text, t.bigint, t.bigint, t.indexed_text, t.indexed_text
        ),
        format!(
            "CREATE TABLE Changes(seq {}, changeType INTEGER, internalId {} NOT NULL REFERENCES Resources(internalId) ON DELETE CASCADE, resourceType INTEGER, date {})",
            t.serial_key, t.bigint, t.indexed_text
        ),
        format!(
            "CREATE TABLE ExportedResources(seq {}, resourceType INTEGER, publicId {}, remoteModality {}, patientId {}, studyInstanceUid {}, seriesInstanceUid {}, sopInstanceUid {}, date {})",
            t.serial_key,
            t.indexed_text,
            t.text,
            t.indexed_text,
            t.indexed_text,
            t.indexed_text,
            t.indexed_text,
            t.indexed_text
        ),
        format!(
            "CREATE TABLE Labels({}, label {} NOT NULL, PRIMARY KEY(id, label))",
            owner, t.indexed_text
        ),
        "CREATE INDEX ChildrenIndex ON Resources(parentId)".to_string(),
        "CREATE INDEX PublicIndex ON Resources(publicId)".to_string(),
        "CREATE INDEX ResourceTypeIndex ON Resources(resourceType)".to_string(),
        format!(
            "CREATE INDEX MainDicomTagsIndex ON {}(tagGroup, tagElement)",
            MAIN_DICOM_TAGS_TABLE
        ),
        format!(
            "CREATE INDEX DicomIdentifiersIndex ON {}(tagGroup, tagElement, value)",
            DICOM_IDENTIFIERS_TABLE
        ),
        "CREATE INDEX ChangesIndex ON Changes(internalId)".to_string(),
        "CREATE INDEX LabelsIndex ON Labels(label)".to_string(),
    ];

    let mut sql = statements.join(";\n");
    sql.push(';');
    sql
}

/// Creates the schema if the database has no `Resources` table.
///
/// Returns `true` if the schema was created.
pub fn install(manager: &mut DatabaseManager) -> BackendResult<bool> {
    if manager.does_table_exist("Resources")? {
        debug!("Index schema already present");
        return Ok(false);
    }

    let dialect = manager.dialect();
    info!(%dialect, version = SCHEMA_VERSION, "Installing index schema");

    manager.execute_batch(&schema_sql(dialect))?;
    manager.execute(
        "INSERT INTO GlobalProperties (property, value) VALUES (${property}, ${value})",
        &Dictionary::new()
            .with("property", GLOBAL_PROPERTY_SCHEMA_VERSION)
            .with("value", SCHEMA_VERSION.to_string()),
    )?;

    Ok(true)
}
