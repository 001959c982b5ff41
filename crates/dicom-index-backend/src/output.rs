//! Typed answers returned to the host.
//!
//! Each index operation that produces rows writes them to an [`Output`].
//! The host decides which kind of answer a call produces; an `Output`
//! only checks that one execution does not mix kinds.

use std::fmt;

use dicom_index_sql::{DicomTag, ResourceLevel};

use crate::error::{BackendError, BackendResult};

/// Descriptor of a file attached to a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Storage identifier of the file.
    pub uuid: String,
    /// Kind of content (DICOM, JSON summary...).
    pub content_type: i32,
    /// Size before compression.
    pub uncompressed_size: i64,
    /// MD5 of the uncompressed content.
    pub uncompressed_hash: String,
    /// Compression scheme.
    pub compression_type: i32,
    /// Size as stored.
    pub compressed_size: i64,
    /// MD5 of the stored content.
    pub compressed_hash: String,
    /// Revision number.
    pub revision: i64,
}

/// One entry of the change log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Sequence number.
    pub seq: i64,
    /// Kind of change.
    pub change_type: i32,
    /// Level of the changed resource.
    pub level: ResourceLevel,
    /// Public identifier of the changed resource.
    pub public_id: String,
    /// Timestamp, `YYYYMMDDTHHMMSS`.
    pub date: String,
}

/// One entry of the export log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedResource {
    /// Sequence number (ignored when logging).
    pub seq: i64,
    /// Level of the exported resource.
    pub level: ResourceLevel,
    /// Public identifier of the exported resource.
    pub public_id: String,
    /// Remote modality the resource was sent to.
    pub modality: String,
    /// Timestamp, `YYYYMMDDTHHMMSS`.
    pub date: String,
    /// Patient ID of the resource.
    pub patient_id: String,
    /// Study Instance UID of the resource.
    pub study_instance_uid: String,
    /// Series Instance UID (empty above series level).
    pub series_instance_uid: String,
    /// SOP Instance UID (empty above instance level).
    pub sop_instance_uid: String,
}

/// One answer row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Attachment descriptor.
    Attachment(Attachment),
    /// Change-log entry.
    Change(Change),
    /// Main DICOM tag value.
    DicomTag {
        /// The tag.
        tag: DicomTag,
        /// Its value.
        value: String,
    },
    /// Export-log entry.
    ExportedResource(ExportedResource),
    /// Resource matched by a lookup.
    MatchingResource {
        /// Public identifier of the match.
        public_id: String,
        /// Public identifier of one instance below the match, if requested.
        some_instance: Option<String>,
    },
    /// Label.
    Label(String),
    /// Metadata entry.
    Metadata {
        /// Metadata key.
        key: i32,
        /// Metadata value.
        value: String,
        /// Revision number.
        revision: i64,
    },
    /// Plain string.
    String(String),
    /// Plain integer.
    Integer(i64),
}

/// Discriminant of an [`Answer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnswerKind {
    /// [`Answer::Attachment`]
    Attachment,
    /// [`Answer::Change`]
    Change,
    /// [`Answer::DicomTag`]
    DicomTag,
    /// [`Answer::ExportedResource`]
    ExportedResource,
    /// [`Answer::MatchingResource`]
    MatchingResource,
    /// [`Answer::Label`]
    Label,
    /// [`Answer::Metadata`]
    Metadata,
    /// [`Answer::String`]
    String,
    /// [`Answer::Integer`]
    Integer,
}

impl Answer {
    /// Kind of this answer.
    pub fn kind(&self) -> AnswerKind {
        match self {
            Answer::Attachment(_) => AnswerKind::Attachment,
            Answer::Change(_) => AnswerKind::Change,
            Answer::DicomTag { .. } => AnswerKind::DicomTag,
            Answer::ExportedResource(_) => AnswerKind::ExportedResource,
            Answer::MatchingResource { .. } => AnswerKind::MatchingResource,
            Answer::Label(_) => AnswerKind::Label,
            Answer::Metadata { .. } => AnswerKind::Metadata,
            Answer::String(_) => AnswerKind::String,
            Answer::Integer(_) => AnswerKind::Integer,
        }
    }
}

impl fmt::Display for AnswerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Answer sink for one execution.
///
/// # Example
///
/// ```rust
/// use dicom_index_backend::{AnswerKind, Output};
///
/// let mut output = Output::new();
/// output.answer_label("reviewed").unwrap();
/// output.answer_label("teaching").unwrap();
/// assert_eq!(output.kind(), Some(AnswerKind::Label));
///
/// // Mixing kinds within one execution is rejected
/// assert!(output.answer_integer(1).is_err());
///
/// output.clear();
/// output.answer_integer(1).unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    kind: Option<AnswerKind>,
    answers: Vec<Answer>,
}

impl Output {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an answer, enforcing a single kind per execution.
    pub fn push(&mut self, answer: Answer) -> BackendResult<()> {
        let kind = answer.kind();
        match self.kind {
            Some(current) if current != kind => Err(BackendError::BadSequenceOfCalls(format!(
                "cannot answer {} after {}",
                kind, current
            ))),
            _ => {
                self.kind = Some(kind);
                self.answers.push(answer);
                Ok(())
            }
        }
    }

    /// Emits an attachment descriptor.
    pub fn answer_attachment(&mut self, attachment: Attachment) -> BackendResult<()> {
        self.push(Answer::Attachment(attachment))
    }

    /// Emits a change-log entry.
    pub fn answer_change(&mut self, change: Change) -> BackendResult<()> {
        self.push(Answer::Change(change))
    }

    /// Emits a main DICOM tag.
    pub fn answer_dicom_tag(&mut self, tag: DicomTag, value: impl Into<String>) -> BackendResult<()> {
        self.push(Answer::DicomTag {
            tag,
            value: value.into(),
        })
    }

    /// Emits an export-log entry.
    pub fn answer_exported_resource(&mut self, resource: ExportedResource) -> BackendResult<()> {
        self.push(Answer::ExportedResource(resource))
    }

    /// Emits a lookup match.
    pub fn answer_matching_resource(
        &mut self,
        public_id: impl Into<String>,
        some_instance: Option<String>,
    ) -> BackendResult<()> {
        self.push(Answer::MatchingResource {
            public_id: public_id.into(),
            some_instance,
        })
    }

    /// Emits a label.
    pub fn answer_label(&mut self, label: impl Into<String>) -> BackendResult<()> {
        self.push(Answer::Label(label.into()))
    }

    /// Emits a metadata entry.
    pub fn answer_metadata(&mut self, key: i32, value: impl Into<String>, revision: i64) -> BackendResult<()> {
        self.push(Answer::Metadata {
            key,
            value: value.into(),
            revision,
        })
    }

    /// Emits a string.
    pub fn answer_string(&mut self, value: impl Into<String>) -> BackendResult<()> {
        self.push(Answer::String(value.into()))
    }

    /// Emits an integer.
    pub fn answer_integer(&mut self, value: i64) -> BackendResult<()> {
        self.push(Answer::Integer(value))
    }

    /// Kind of the answers emitted so far.
    pub fn kind(&self) -> Option<AnswerKind> {
        self.kind
    }

    /// Answers emitted so far.
    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    /// Consumes the sink.
    pub fn into_answers(self) -> Vec<Answer> {
        self.answers
    }

    /// Number of answers.
    pub fn len(&self) -> usize {
        self.answers.len()
    }

    /// Returns true if nothing was emitted.
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Resets the sink for another execution.
    pub fn clear(&mut self) {
        self.kind = None;
        self.answers.clear();
    }

    /// Public identifiers of the [`Answer::MatchingResource`] answers.
    pub fn matching_public_ids(&self) -> Vec<&str> {
        self.answers
            .iter()
            .filter_map(|answer| match answer {
                Answer::MatchingResource { public_id, .. } => Some(public_id.as_str()),
                _ => None,
            })
            .collect()
    }
}
