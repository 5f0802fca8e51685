//! Optional RFC 3339 timestamps that decode under `bincode` as well as JSON.
//!
//! The inner value is read as a string, never through `deserialize_any`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;

#[derive(Serialize, Deserialize)]
struct Stamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime);

#[allow(clippy::ref_option)]
pub fn serialize<S: Serializer>(
    value: &Option<OffsetDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    value.map(Stamp).serialize(serializer)
}

pub fn deserialize<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<OffsetDateTime>, D::Error> {
    Ok(Option::<Stamp>::deserialize(deserializer)?.map(|Stamp(at)| at))
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use time::{OffsetDateTime, macros::datetime};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Holder {
        #[serde(default, with = "crate::types::timestamp")]
        at: Option<OffsetDateTime>,
    }

    #[test]
    fn json_keeps_the_text_form() {
        let holder = Holder {
            at: Some(datetime!(2024-03-01 12:30 UTC)),
        };
        let json = serde_json::to_string(&holder).unwrap();
        assert_eq!(json, r#"{"at":"2024-03-01T12:30:00Z"}"#);
        assert_eq!(serde_json::from_str::<Holder>(&json).unwrap(), holder);
        assert_eq!(
            serde_json::from_str::<Holder>("{}").unwrap(),
            Holder { at: None }
        );
    }

    #[test]
    fn bincode_reads_set_and_unset_values() {
        for at in [None, Some(datetime!(2024-03-01 12:30 UTC))] {
            let bytes = bincode::serialize(&Holder { at }).unwrap();
            assert_eq!(bincode::deserialize::<Holder>(&bytes).unwrap().at, at);
        }
    }
}
