//! Profile fields and field patches

use crate::crop::CropCoordinates;
use crate::ids::RecordId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Named field of a profile record
///
/// Serialized as its backend column name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProfileField {
    Name,
    Gender,
    Status,
    MotherId,
    FatherId,
    SpouseId,
    BirthDate,
    DeathDate,
    /// Reference to the displayed (possibly cropped) photo
    PhotoUrl,
    /// Reference to the untouched original photo
    PhotoOriginalUrl,
    CropTop,
    CropBottom,
    CropLeft,
    CropRight,
    /// Any column this crate does not know about
    Custom(String),
}

impl ProfileField {
    /// Backend column name
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Name => "name",
            Self::Gender => "gender",
            Self::Status => "status",
            Self::MotherId => "mother_id",
            Self::FatherId => "father_id",
            Self::SpouseId => "spouse_id",
            Self::BirthDate => "birth_date",
            Self::DeathDate => "death_date",
            Self::PhotoUrl => "photo_url",
            Self::PhotoOriginalUrl => "photo_original_url",
            Self::CropTop => "crop_top",
            Self::CropBottom => "crop_bottom",
            Self::CropLeft => "crop_left",
            Self::CropRight => "crop_right",
            Self::Custom(name) => name,
        }
    }

    /// Whether the field carries media reference or crop metadata
    #[must_use]
    pub fn is_media(&self) -> bool {
        matches!(
            self,
            Self::PhotoUrl
                | Self::PhotoOriginalUrl
                | Self::CropTop
                | Self::CropBottom
                | Self::CropLeft
                | Self::CropRight
        )
    }
}

impl Display for ProfileField {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileField {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "name" => Self::Name,
            "gender" => Self::Gender,
            "status" => Self::Status,
            "mother_id" => Self::MotherId,
            "father_id" => Self::FatherId,
            "spouse_id" => Self::SpouseId,
            "birth_date" => Self::BirthDate,
            "death_date" => Self::DeathDate,
            "photo_url" => Self::PhotoUrl,
            "photo_original_url" => Self::PhotoOriginalUrl,
            "crop_top" => Self::CropTop,
            "crop_bottom" => Self::CropBottom,
            "crop_left" => Self::CropLeft,
            "crop_right" => Self::CropRight,
            other => Self::Custom(other.to_string()),
        })
    }
}

impl Serialize for ProfileField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProfileField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        // Infallible
        Ok(raw.parse().unwrap_or(Self::Custom(raw)))
    }
}

/// Set of field assignments committed together in one write
///
/// All entries commit atomically or not at all. A `null` value clears a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPatch(BTreeMap<ProfileField, Value>);

impl FieldPatch {
    /// Empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a field
    #[must_use]
    pub fn set(mut self, field: ProfileField, value: impl Into<Value>) -> Self {
        self.0.insert(field, value.into());
        self
    }

    /// Assign a field in place
    pub fn insert(&mut self, field: ProfileField, value: impl Into<Value>) {
        self.0.insert(field, value.into());
    }

    /// Set display name
    #[must_use]
    pub fn name(self, name: impl Into<String>) -> Self {
        self.set(ProfileField::Name, name.into())
    }

    /// Set gender
    #[must_use]
    pub fn gender(self, gender: impl Into<String>) -> Self {
        self.set(ProfileField::Gender, gender.into())
    }

    /// Set living status
    #[must_use]
    pub fn status(self, status: impl Into<String>) -> Self {
        self.set(ProfileField::Status, status.into())
    }

    /// Assign or clear the mother reference
    #[must_use]
    pub fn mother(self, mother: Option<&RecordId>) -> Self {
        self.set(ProfileField::MotherId, reference_value(mother))
    }

    /// Assign or clear the spouse reference
    #[must_use]
    pub fn spouse(self, spouse: Option<&RecordId>) -> Self {
        self.set(ProfileField::SpouseId, reference_value(spouse))
    }

    /// Point the displayed photo at `url`
    #[must_use]
    pub fn photo(self, url: impl Into<String>) -> Self {
        self.set(ProfileField::PhotoUrl, url.into())
    }

    /// Attach crop metadata (stored alongside the photo reference)
    #[must_use]
    pub fn crop(mut self, crop: &CropCoordinates) -> Self {
        self.0.insert(ProfileField::CropTop, crop.top().into());
        self.0.insert(ProfileField::CropBottom, crop.bottom().into());
        self.0.insert(ProfileField::CropLeft, crop.left().into());
        self.0.insert(ProfileField::CropRight, crop.right().into());
        self
    }

    /// Merge `other` into this patch; `other` wins on overlapping fields
    pub fn merge(&mut self, other: FieldPatch) {
        self.0.extend(other.0);
    }

    /// Value assigned to `field`, if any
    #[inline]
    #[must_use]
    pub fn get(&self, field: &ProfileField) -> Option<&Value> {
        self.0.get(field)
    }

    /// Whether the patch touches `field`
    #[inline]
    #[must_use]
    pub fn contains(&self, field: &ProfileField) -> bool {
        self.0.contains_key(field)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any assignment touches photo or crop fields
    #[must_use]
    pub fn touches_media(&self) -> bool {
        self.0.keys().any(ProfileField::is_media)
    }

    /// Iterate assignments in field order
    pub fn iter(&self) -> impl Iterator<Item = (&ProfileField, &Value)> {
        self.0.iter()
    }

    /// Wire form: `{ column: value }`
    #[must_use]
    pub fn to_wire(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(field, value)| (field.as_str().to_string(), value.clone()))
            .collect()
    }
}

impl FromIterator<(ProfileField, Value)> for FieldPatch {
    fn from_iter<I: IntoIterator<Item = (ProfileField, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn reference_value(id: Option<&RecordId>) -> Value {
    id.map_or(Value::Null, |id| Value::String(id.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_round_trips_through_column_name() {
        for field in [
            ProfileField::Name,
            ProfileField::MotherId,
            ProfileField::PhotoOriginalUrl,
            ProfileField::CropRight,
        ] {
            let parsed: ProfileField = field.as_str().parse().unwrap();
            assert_eq!(parsed, field);
        }
        let custom: ProfileField = "nickname".parse().unwrap();
        assert_eq!(custom, ProfileField::Custom("nickname".to_string()));
    }

    #[test]
    fn patch_wire_form_uses_column_names() {
        let mother = RecordId::new("m-1");
        let patch = FieldPatch::new().name("Ada").mother(Some(&mother));
        let wire = patch.to_wire();
        assert_eq!(wire.get("name"), Some(&json!("Ada")));
        assert_eq!(wire.get("mother_id"), Some(&json!("m-1")));
    }

    #[test]
    fn clearing_a_reference_sends_null() {
        let patch = FieldPatch::new().spouse(None);
        assert_eq!(patch.get(&ProfileField::SpouseId), Some(&Value::Null));
    }

    #[test]
    fn crop_fields_mark_patch_as_media() {
        let crop = CropCoordinates::new(0.1, 0.1, 0.2, 0.2).unwrap();
        let patch = FieldPatch::new().crop(&crop);
        assert_eq!(patch.len(), 4);
        assert!(patch.touches_media());
        assert!(!FieldPatch::new().name("x").touches_media());
    }

    #[test]
    fn merge_prefers_incoming_values() {
        let mut base = FieldPatch::new().name("Old").gender("male");
        base.merge(FieldPatch::new().name("New"));
        assert_eq!(base.get(&ProfileField::Name), Some(&json!("New")));
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn patch_deserializes_from_json_object() {
        let patch: FieldPatch =
            serde_json::from_value(json!({"gender": "female", "nickname": "Bee"})).unwrap();
        assert!(patch.contains(&ProfileField::Gender));
        assert!(patch.contains(&ProfileField::Custom("nickname".to_string())));
    }
}
