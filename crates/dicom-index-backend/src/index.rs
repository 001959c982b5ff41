//! Index operations.
//!
//! Everything the host does with the index happens through methods of an
//! open [`Transaction`]: maintaining the Patient / Study / Series /
//! Instance hierarchy, storing tags, metadata, attachments and labels,
//! logging changes and exports, and running lookups.
//!
//! # Example
//!
//! ```ignore
//! manager.transaction(TransactionMode::ReadWrite, |tx| {
//!     let patient = tx.create_resource("patient-1", ResourceLevel::Patient)?;
//!     let study = tx.create_resource("study-1", ResourceLevel::Study)?;
//!     tx.set_parent(study, patient)?;
//!     tx.set_identifier_tag(study, DicomTag::ACCESSION_NUMBER, "ACC1")?;
//!     tx.log_change(CHANGE_NEW_STUDY, study, ResourceLevel::Study)
//! })?;
//! ```

use std::collections::VecDeque;

use dicom_index_sql::{
    compile_lookup, normalize_identifier, DatabaseConstraints, Dialect, DicomTag, Dictionary,
    LabelFilter, Limits, Lookup, ResourceLevel, Value, DICOM_IDENTIFIERS_TABLE,
    MAIN_DICOM_TAGS_TABLE,
};
use tracing::debug;

use crate::error::{BackendError, BackendResult};
use crate::manager::Transaction;
use crate::output::{Attachment, Change, ExportedResource, Output};
use crate::traits::Row;

/// Format of the timestamps stored in the change and export logs.
pub const DATE_FORMAT: &str = "%Y%m%dT%H%M%S";

fn now() -> String {
    chrono::Utc::now().format(DATE_FORMAT).to_string()
}

// =============================================================================
// Row decoding
// =============================================================================

fn column(row: &Row, index: usize) -> BackendResult<&Value> {
    row.get(index)
        .ok_or_else(|| BackendError::Database(format!("missing column {} in result row", index)))
}

fn integer_at(row: &Row, index: usize) -> BackendResult<i64> {
    match column(row, index)? {
        Value::Integer(value) => Ok(*value),
        Value::Utf8(text) => text.trim().parse().map_err(|_| {
            BackendError::Database(format!("column {} is not an integer: {}", index, text))
        }),
        other => Err(BackendError::Database(format!(
            "column {} is not an integer: {}",
            index, other
        ))),
    }
}

/// Text value of a column; `NULL` reads as an empty string.
fn text_at(row: &Row, index: usize) -> BackendResult<String> {
    match column(row, index)? {
        Value::Utf8(text) => Ok(text.clone()),
        Value::Integer(value) => Ok(value.to_string()),
        Value::Null => Ok(String::new()),
        Value::Binary(bytes) => String::from_utf8(bytes.clone())
            .map_err(|_| BackendError::Database(format!("column {} is not UTF-8", index))),
    }
}

fn u16_at(row: &Row, index: usize) -> BackendResult<u16> {
    let value = integer_at(row, index)?;
    u16::try_from(value)
        .map_err(|_| BackendError::Database(format!("column {} out of range: {}", index, value)))
}

fn level_at(row: &Row, index: usize) -> BackendResult<ResourceLevel> {
    Ok(ResourceLevel::from_code(integer_at(row, index)?)?)
}

/// Row-count suffix for a statement that already has an `ORDER BY`.
fn ordered_limit(dialect: Dialect, limit: u64) -> String {
    match (dialect, limit) {
        (_, 0) => String::new(),
        (Dialect::MSSQL, limit) => format!(" OFFSET 0 ROWS FETCH NEXT {} ROWS ONLY", limit),
        (dialect, limit) => dialect.limits(0, limit),
    }
}

impl Transaction<'_> {
    fn single_row(&mut self, sql: &str, parameters: &Dictionary) -> BackendResult<Option<Row>> {
        Ok(self.execute(sql, parameters)?.into_iter().next())
    }

    // =========================================================================
    // Hierarchy
    // =========================================================================

    /// Creates a resource without parent and returns its internal id.
    pub fn create_resource(&mut self, public_id: &str, level: ResourceLevel) -> BackendResult<i64> {
        self.execute(
            "INSERT INTO Resources (resourceType, publicId, parentId) VALUES (${type}, ${publicId}, NULL)",
            &Dictionary::new()
                .with("type", level.code())
                .with("publicId", public_id),
        )?;
        let id = self.last_insert_id()?;
        debug!(public_id, %level, id, "Created resource");
        Ok(id)
    }

    /// Attaches `child` below `parent`.
    ///
    /// The parent must sit exactly one level above the child.
    pub fn set_parent(&mut self, child: i64, parent: i64) -> BackendResult<()> {
        let child_level = self.get_resource_type(child)?;
        let parent_level = self.get_resource_type(parent)?;

        if child_level.parent() != Some(parent_level) {
            return Err(BackendError::ParameterOutOfRange(format!(
                "a {} cannot be the parent of a {}",
                parent_level, child_level
            )));
        }

        self.execute(
            "UPDATE Resources SET parentId = ${parent} WHERE internalId = ${child}",
            &Dictionary::new().with("parent", parent).with("child", child),
        )?;
        Ok(())
    }

    /// Internal id and level of the resource with `public_id`.
    pub fn lookup_resource(&mut self, public_id: &str) -> BackendResult<Option<(i64, ResourceLevel)>> {
        let row = self.single_row(
            "SELECT internalId, resourceType FROM Resources WHERE publicId = ${publicId}",
            &Dictionary::new().with("publicId", public_id),
        )?;

        row.map(|row| Ok((integer_at(&row, 0)?, level_at(&row, 1)?)))
            .transpose()
    }

    /// Public id of resource `id`.
    pub fn get_public_id(&mut self, id: i64) -> BackendResult<String> {
        let row = self.single_row(
            "SELECT publicId FROM Resources WHERE internalId = ${id}",
            &Dictionary::new().with("id", id),
        )?;

        match row {
            Some(row) => text_at(&row, 0),
            None => Err(BackendError::UnknownResource(id.to_string())),
        }
    }

    /// Level of resource `id`.
    pub fn get_resource_type(&mut self, id: i64) -> BackendResult<ResourceLevel> {
        let row = self.single_row(
            "SELECT resourceType FROM Resources WHERE internalId = ${id}",
            &Dictionary::new().with("id", id),
        )?;

        match row {
            Some(row) => level_at(&row, 0),
            None => Err(BackendError::UnknownResource(id.to_string())),
        }
    }

    /// Public id of the parent of `id`, if it has one.
    pub fn get_parent_public_id(&mut self, id: i64) -> BackendResult<Option<String>> {
        let row = self.single_row(
            "SELECT parent.publicId FROM Resources AS parent INNER JOIN Resources AS child \
             ON parent.internalId = child.parentId WHERE child.internalId = ${id}",
            &Dictionary::new().with("id", id),
        )?;

        row.map(|row| text_at(&row, 0)).transpose()
    }

    /// Internal ids of the children of `id`.
    pub fn get_children_internal_ids(&mut self, id: i64) -> BackendResult<Vec<i64>> {
        self.execute(
            "SELECT internalId FROM Resources WHERE parentId = ${id}",
            &Dictionary::new().with("id", id),
        )?
        .iter()
        .map(|row| integer_at(row, 0))
        .collect()
    }

    /// Public ids of the children of `id`.
    pub fn get_children_public_ids(&mut self, id: i64) -> BackendResult<Vec<String>> {
        self.execute(
            "SELECT publicId FROM Resources WHERE parentId = ${id}",
            &Dictionary::new().with("id", id),
        )?
        .iter()
        .map(|row| text_at(row, 0))
        .collect()
    }

    /// Public ids of every resource at `level`.
    pub fn get_all_public_ids(&mut self, level: ResourceLevel) -> BackendResult<Vec<String>> {
        self.execute(
            "SELECT publicId FROM Resources WHERE resourceType = ${type}",
            &Dictionary::new().with("type", level.code()),
        )?
        .iter()
        .map(|row| text_at(row, 0))
        .collect()
    }

    /// Number of resources at `level`.
    pub fn get_resources_count(&mut self, level: ResourceLevel) -> BackendResult<u64> {
        let row = self.single_row(
            "SELECT COUNT(*) FROM Resources WHERE resourceType = ${type}",
            &Dictionary::new().with("type", level.code()),
        )?;

        let count = match row {
            Some(row) => integer_at(&row, 0)?,
            None => 0,
        };
        u64::try_from(count).map_err(|_| BackendError::Database(format!("negative count {}", count)))
    }

    /// Deletes `id` and its whole subtree.
    ///
    /// The attachments of every deleted resource are written to `output`
    /// so the host can remove the stored files.
    pub fn delete_resource(&mut self, output: &mut Output, id: i64) -> BackendResult<()> {
        self.get_resource_type(id)?;

        // Breadth-first walk, deleted in reverse so children go before parents
        let mut subtree = vec![id];
        let mut pending = VecDeque::from([id]);
        while let Some(current) = pending.pop_front() {
            for child in self.get_children_internal_ids(current)? {
                subtree.push(child);
                pending.push_back(child);
            }
        }

        for resource in subtree.iter().rev() {
            self.list_attachments(output, *resource)?;
            self.execute(
                "DELETE FROM Resources WHERE internalId = ${id}",
                &Dictionary::new().with("id", *resource),
            )?;
        }

        debug!(id, deleted = subtree.len(), "Deleted resource subtree");
        Ok(())
    }

    // =========================================================================
    // Tags
    // =========================================================================

    /// Stores a main DICOM tag of resource `id`.
    pub fn set_main_dicom_tag(&mut self, id: i64, tag: DicomTag, value: &str) -> BackendResult<()> {
        self.insert_tag(MAIN_DICOM_TAGS_TABLE, id, tag, value)
    }

    /// Stores an identifier tag of resource `id`, normalized for lookups.
    pub fn set_identifier_tag(&mut self, id: i64, tag: DicomTag, value: &str) -> BackendResult<()> {
        self.insert_tag(DICOM_IDENTIFIERS_TABLE, id, tag, &normalize_identifier(value))
    }

    fn insert_tag(&mut self, table: &str, id: i64, tag: DicomTag, value: &str) -> BackendResult<()> {
        self.execute(
            &format!(
                "INSERT INTO {} (id, tagGroup, tagElement, value) VALUES (${{id}}, ${{group}}, ${{element}}, ${{value}})",
                table
            ),
            &Dictionary::new()
                .with("id", id)
                .with("group", i64::from(tag.group))
                .with("element", i64::from(tag.element))
                .with("value", value),
        )?;
        Ok(())
    }

    /// Writes the main DICOM tags of `id` to `output`.
    pub fn get_main_dicom_tags(&mut self, output: &mut Output, id: i64) -> BackendResult<()> {
        let rows = self.execute(
            "SELECT tagGroup, tagElement, value FROM MainDicomTags WHERE id = ${id}",
            &Dictionary::new().with("id", id),
        )?;

        for row in &rows {
            let tag = DicomTag::new(u16_at(row, 0)?, u16_at(row, 1)?);
            output.answer_dicom_tag(tag, text_at(row, 2)?)?;
        }
        Ok(())
    }

    /// Removes every main and identifier tag of `id`.
    pub fn clear_main_dicom_tags(&mut self, id: i64) -> BackendResult<()> {
        let parameters = Dictionary::new().with("id", id);
        self.execute("DELETE FROM MainDicomTags WHERE id = ${id}", &parameters)?;
        self.execute("DELETE FROM DicomIdentifiers WHERE id = ${id}", &parameters)?;
        Ok(())
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Sets metadata `key` of `id`, replacing any previous value.
    pub fn set_metadata(&mut self, id: i64, key: i32, value: &str, revision: i64) -> BackendResult<()> {
        self.delete_metadata(id, key)?;
        self.execute(
            "INSERT INTO Metadata (id, type, value, revision) VALUES (${id}, ${type}, ${value}, ${revision})",
            &Dictionary::new()
                .with("id", id)
                .with("type", key)
                .with("value", value)
                .with("revision", revision),
        )?;
        Ok(())
    }

    /// Value and revision of metadata `key` of `id`.
    pub fn get_metadata(&mut self, id: i64, key: i32) -> BackendResult<Option<(String, i64)>> {
        let row = self.single_row(
            "SELECT value, revision FROM Metadata WHERE id = ${id} AND type = ${type}",
            &Dictionary::new().with("id", id).with("type", key),
        )?;

        row.map(|row| {
            let revision = match column(&row, 1)? {
                Value::Null => 0,
                _ => integer_at(&row, 1)?,
            };
            Ok((text_at(&row, 0)?, revision))
        })
        .transpose()
    }

    /// Writes every metadata entry of `id` to `output`.
    pub fn list_metadata(&mut self, output: &mut Output, id: i64) -> BackendResult<()> {
        let rows = self.execute(
            "SELECT type, value, revision FROM Metadata WHERE id = ${id} ORDER BY type",
            &Dictionary::new().with("id", id),
        )?;

        for row in &rows {
            let key = i32::try_from(integer_at(row, 0)?)
                .map_err(|_| BackendError::Database("metadata key out of range".to_string()))?;
            let revision = match column(row, 2)? {
                Value::Null => 0,
                _ => integer_at(row, 2)?,
            };
            output.answer_metadata(key, text_at(row, 1)?, revision)?;
        }
        Ok(())
    }

    /// Removes metadata `key` of `id`.
    pub fn delete_metadata(&mut self, id: i64, key: i32) -> BackendResult<()> {
        self.execute(
            "DELETE FROM Metadata WHERE id = ${id} AND type = ${type}",
            &Dictionary::new().with("id", id).with("type", key),
        )?;
        Ok(())
    }

    // =========================================================================
    // Attachments
    // =========================================================================

    /// Attaches a file to `id`.
    pub fn add_attachment(&mut self, id: i64, attachment: &Attachment) -> BackendResult<()> {
        self.execute(
            "INSERT INTO AttachedFiles (id, fileType, uuid, compressedSize, uncompressedSize, compressionType, uncompressedHash, compressedHash, revision) \
             VALUES (${id}, ${type}, ${uuid}, ${compressedSize}, ${uncompressedSize}, ${compressionType}, ${uncompressedHash}, ${compressedHash}, ${revision})",
            &Dictionary::new()
                .with("id", id)
                .with("type", attachment.content_type)
                .with("uuid", attachment.uuid.as_str())
                .with("compressedSize", attachment.compressed_size)
                .with("uncompressedSize", attachment.uncompressed_size)
                .with("compressionType", attachment.compression_type)
                .with("uncompressedHash", attachment.uncompressed_hash.as_str())
                .with("compressedHash", attachment.compressed_hash.as_str())
                .with("revision", attachment.revision),
        )?;
        Ok(())
    }

    const ATTACHMENT_COLUMNS: &'static str =
        "uuid, fileType, uncompressedSize, uncompressedHash, compressionType, compressedSize, compressedHash, revision";

    fn attachment_from_row(row: &Row) -> BackendResult<Attachment> {
        let small = |index: usize| -> BackendResult<i32> {
            i32::try_from(integer_at(row, index)?)
                .map_err(|_| BackendError::Database(format!("column {} out of range", index)))
        };

        Ok(Attachment {
            uuid: text_at(row, 0)?,
            content_type: small(1)?,
            uncompressed_size: integer_at(row, 2)?,
            uncompressed_hash: text_at(row, 3)?,
            compression_type: small(4)?,
            compressed_size: integer_at(row, 5)?,
            compressed_hash: text_at(row, 6)?,
            revision: match column(row, 7)? {
                Value::Null => 0,
                _ => integer_at(row, 7)?,
            },
        })
    }

    /// Writes every attachment of `id` to `output`.
    pub fn list_attachments(&mut self, output: &mut Output, id: i64) -> BackendResult<()> {
        let rows = self.execute(
            &format!(
                "SELECT {} FROM AttachedFiles WHERE id = ${{id}} ORDER BY fileType",
                Self::ATTACHMENT_COLUMNS
            ),
            &Dictionary::new().with("id", id),
        )?;

        for row in &rows {
            output.answer_attachment(Self::attachment_from_row(row)?)?;
        }
        Ok(())
    }

    /// The attachment of `id` with `content_type`, if any.
    pub fn lookup_attachment(&mut self, id: i64, content_type: i32) -> BackendResult<Option<Attachment>> {
        let row = self.single_row(
            &format!(
                "SELECT {} FROM AttachedFiles WHERE id = ${{id}} AND fileType = ${{type}}",
                Self::ATTACHMENT_COLUMNS
            ),
            &Dictionary::new().with("id", id).with("type", content_type),
        )?;

        row.map(|row| Self::attachment_from_row(&row)).transpose()
    }

    /// Removes the attachment of `id` with `content_type`.
    pub fn delete_attachment(&mut self, id: i64, content_type: i32) -> BackendResult<()> {
        self.execute(
            "DELETE FROM AttachedFiles WHERE id = ${id} AND fileType = ${type}",
            &Dictionary::new().with("id", id).with("type", content_type),
        )?;
        Ok(())
    }

    // =========================================================================
    // Labels
    // =========================================================================

    fn check_label(label: &str) -> BackendResult<()> {
        if label.is_empty() {
            Err(BackendError::ParameterOutOfRange("empty label".to_string()))
        } else {
            Ok(())
        }
    }

    /// Adds `label` to `id`. Adding an existing label does nothing.
    pub fn add_label(&mut self, id: i64, label: &str) -> BackendResult<()> {
        Self::check_label(label)?;
        let parameters = Dictionary::new().with("id", id).with("label", label);

        let existing = self.single_row(
            "SELECT COUNT(*) FROM Labels WHERE id = ${id} AND label = ${label}",
            &parameters,
        )?;
        if let Some(row) = existing {
            if integer_at(&row, 0)? > 0 {
                return Ok(());
            }
        }

        self.execute(
            "INSERT INTO Labels (id, label) VALUES (${id}, ${label})",
            &parameters,
        )?;
        Ok(())
    }

    /// Removes `label` from `id`.
    pub fn remove_label(&mut self, id: i64, label: &str) -> BackendResult<()> {
        Self::check_label(label)?;
        self.execute(
            "DELETE FROM Labels WHERE id = ${id} AND label = ${label}",
            &Dictionary::new().with("id", id).with("label", label),
        )?;
        Ok(())
    }

    /// Writes the labels of `id` to `output`, sorted.
    pub fn list_labels(&mut self, output: &mut Output, id: i64) -> BackendResult<()> {
        let rows = self.execute(
            "SELECT label FROM Labels WHERE id = ${id} ORDER BY label",
            &Dictionary::new().with("id", id),
        )?;

        for row in &rows {
            output.answer_label(text_at(row, 0)?)?;
        }
        Ok(())
    }

    /// Writes every label in use to `output`, sorted.
    pub fn list_all_labels(&mut self, output: &mut Output) -> BackendResult<()> {
        let rows = self.execute(
            "SELECT DISTINCT label FROM Labels ORDER BY label",
            &Dictionary::new(),
        )?;

        for row in &rows {
            output.answer_label(text_at(row, 0)?)?;
        }
        Ok(())
    }

    // =========================================================================
    // Change log
    // =========================================================================

    /// Appends a change of `id` to the log.
    pub fn log_change(&mut self, change_type: i32, id: i64, level: ResourceLevel) -> BackendResult<()> {
        self.execute(
            "INSERT INTO Changes (changeType, internalId, resourceType, date) VALUES (${type}, ${id}, ${level}, ${date})",
            &Dictionary::new()
                .with("type", change_type)
                .with("id", id)
                .with("level", level.code())
                .with("date", now()),
        )?;
        Ok(())
    }

    /// Writes the changes with a sequence number above `since` to `output`,
    /// at most `limit` of them (0 = all).
    ///
    /// Returns `true` when no further change remains.
    pub fn get_changes(&mut self, output: &mut Output, since: i64, limit: u64) -> BackendResult<bool> {
        let fetch = if limit == 0 { 0 } else { limit + 1 };
        let sql = format!(
            "SELECT Changes.seq, Changes.changeType, Changes.resourceType, Changes.date, Resources.publicId \
             FROM Changes INNER JOIN Resources ON Changes.internalId = Resources.internalId \
             WHERE Changes.seq > ${{since}} ORDER BY Changes.seq{}",
            ordered_limit(self.dialect(), fetch)
        );
        let rows = self.execute(&sql, &Dictionary::new().with("since", since))?;

        let done = limit == 0 || rows.len() as u64 <= limit;
        for row in rows.iter().take(if limit == 0 { rows.len() } else { limit as usize }) {
            output.answer_change(Change {
                seq: integer_at(row, 0)?,
                change_type: i32::try_from(integer_at(row, 1)?)
                    .map_err(|_| BackendError::Database("change type out of range".to_string()))?,
                level: level_at(row, 2)?,
                date: text_at(row, 3)?,
                public_id: text_at(row, 4)?,
            })?;
        }
        Ok(done)
    }

    /// Sequence number of the last logged change (0 if none).
    pub fn get_last_change_index(&mut self) -> BackendResult<i64> {
        let sql = format!(
            "SELECT seq FROM Changes ORDER BY seq DESC{}",
            ordered_limit(self.dialect(), 1)
        );
        match self.single_row(&sql, &Dictionary::new())? {
            Some(row) => integer_at(&row, 0),
            None => Ok(0),
        }
    }

    /// Empties the change log.
    pub fn clear_changes(&mut self) -> BackendResult<()> {
        self.execute("DELETE FROM Changes", &Dictionary::new())?;
        Ok(())
    }

    // =========================================================================
    // Export log
    // =========================================================================

    /// Appends an export to the log. An empty `date` is replaced by now.
    pub fn log_exported_resource(&mut self, resource: &ExportedResource) -> BackendResult<()> {
        let date = if resource.date.is_empty() {
            now()
        } else {
            resource.date.clone()
        };

        self.execute(
            "INSERT INTO ExportedResources (resourceType, publicId, remoteModality, patientId, studyInstanceUid, seriesInstanceUid, sopInstanceUid, date) \
             VALUES (${level}, ${publicId}, ${modality}, ${patientId}, ${study}, ${series}, ${instance}, ${date})",
            &Dictionary::new()
                .with("level", resource.level.code())
                .with("publicId", resource.public_id.as_str())
                .with("modality", resource.modality.as_str())
                .with("patientId", resource.patient_id.as_str())
                .with("study", resource.study_instance_uid.as_str())
                .with("series", resource.series_instance_uid.as_str())
                .with("instance", resource.sop_instance_uid.as_str())
                .with("date", date),
        )?;
        Ok(())
    }

    /// Writes the exports with a sequence number above `since` to `output`,
    /// at most `limit` of them (0 = all).
    ///
    /// Returns `true` when no further export remains.
    pub fn get_exported_resources(&mut self, output: &mut Output, since: i64, limit: u64) -> BackendResult<bool> {
        let fetch = if limit == 0 { 0 } else { limit + 1 };
        let sql = format!(
            "SELECT seq, resourceType, publicId, remoteModality, date, patientId, studyInstanceUid, seriesInstanceUid, sopInstanceUid \
             FROM ExportedResources WHERE seq > ${{since}} ORDER BY seq{}",
            ordered_limit(self.dialect(), fetch)
        );
        let rows = self.execute(&sql, &Dictionary::new().with("since", since))?;

        let done = limit == 0 || rows.len() as u64 <= limit;
        for row in rows.iter().take(if limit == 0 { rows.len() } else { limit as usize }) {
            output.answer_exported_resource(ExportedResource {
                seq: integer_at(row, 0)?,
                level: level_at(row, 1)?,
                public_id: text_at(row, 2)?,
                modality: text_at(row, 3)?,
                date: text_at(row, 4)?,
                patient_id: text_at(row, 5)?,
                study_instance_uid: text_at(row, 6)?,
                series_instance_uid: text_at(row, 7)?,
                sop_instance_uid: text_at(row, 8)?,
            })?;
        }
        Ok(done)
    }

    /// Empties the export log.
    pub fn clear_exported_resources(&mut self) -> BackendResult<()> {
        self.execute("DELETE FROM ExportedResources", &Dictionary::new())?;
        Ok(())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Runs a lookup and writes the matching resources to `output`.
    ///
    /// With `request_some_instance`, each match carries the public id of
    /// one instance below it (the match itself at instance level).
    pub fn lookup_resources(
        &mut self,
        output: &mut Output,
        lookup: &DatabaseConstraints,
        level: ResourceLevel,
        labels: &LabelFilter,
        limits: Limits,
        request_some_instance: bool,
    ) -> BackendResult<()> {
        let compiled = compile_lookup(self.dialect(), lookup, level, labels, limits)?;
        debug!(strategy = %compiled.strategy, %level, "Running lookup");

        let rows = self.execute(&compiled.sql, &compiled.parameters)?;

        for row in &rows {
            let public_id = text_at(row, 0)?;
            let some_instance = if request_some_instance {
                let internal_id = integer_at(row, 1)?;
                self.find_some_instance(internal_id, level)?
            } else {
                None
            };
            output.answer_matching_resource(public_id, some_instance)?;
        }
        Ok(())
    }

    /// [`lookup_resources`](Self::lookup_resources) for a built [`Lookup`].
    pub fn run_lookup(
        &mut self,
        output: &mut Output,
        lookup: &Lookup,
        request_some_instance: bool,
    ) -> BackendResult<()> {
        self.lookup_resources(
            output,
            &lookup.constraints,
            lookup.level,
            &lookup.labels,
            lookup.limits,
            request_some_instance,
        )
    }

    fn find_some_instance(&mut self, id: i64, level: ResourceLevel) -> BackendResult<Option<String>> {
        let sql = format!(
            "SELECT internalId FROM Resources WHERE parentId = ${{id}} ORDER BY internalId{}",
            ordered_limit(self.dialect(), 1)
        );

        let mut current = id;
        let mut current_level = level;
        while current_level < ResourceLevel::Instance {
            match self.single_row(&sql, &Dictionary::new().with("id", current))? {
                Some(row) => current = integer_at(&row, 0)?,
                None => return Ok(None),
            }
            current_level = match current_level.child() {
                Some(child) => child,
                None => break,
            };
        }

        self.get_public_id(current).map(Some)
    }

    // =========================================================================
    // Global properties
    // =========================================================================

    /// Sets global property `property`.
    pub fn set_global_property(&mut self, property: i32, value: &str) -> BackendResult<()> {
        let parameters = Dictionary::new().with("property", property).with("value", value);
        self.execute(
            "DELETE FROM GlobalProperties WHERE property = ${property}",
            &parameters,
        )?;
        self.execute(
            "INSERT INTO GlobalProperties (property, value) VALUES (${property}, ${value})",
            &parameters,
        )?;
        Ok(())
    }

    /// Value of global property `property`.
    pub fn lookup_global_property(&mut self, property: i32) -> BackendResult<Option<String>> {
        let row = self.single_row(
            "SELECT value FROM GlobalProperties WHERE property = ${property}",
            &Dictionary::new().with("property", property),
        )?;
        row.map(|row| text_at(&row, 0)).transpose()
    }

    /// Number of rows in the change log.
    pub fn count_changes(&mut self) -> BackendResult<u64> {
        let row = self.single_row("SELECT COUNT(*) FROM Changes", &Dictionary::new())?;
        let count = match row {
            Some(row) => integer_at(&row, 0)?,
            None => 0,
        };
        u64::try_from(count).map_err(|_| BackendError::Database(format!("negative count {}", count)))
    }
}
