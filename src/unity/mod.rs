pub mod types;

use crate::error::Result;
use crate::value::{Value, from_value};
use types::{
    GameObject, MonoBehaviour, MonoScript, StreamedResource, StreamingInfo, TextAsset, Texture2D,
    Transform,
};

/// An object read through one of the typed views.
#[derive(Debug, Clone, PartialEq)]
pub enum KnownObject {
    GameObject(GameObject),
    Transform(Transform),
    MonoBehaviour(MonoBehaviour),
    MonoScript(MonoScript),
    TextAsset(TextAsset),
    Texture2D(Texture2D),
    StreamingInfo(StreamingInfo),
    StreamedResource(StreamedResource),
}

type ViewFn = fn(&Value) -> Result<KnownObject>;

/// Views by schema type name.
pub static VIEWS: &[(&str, ViewFn)] = &[
    ("GameObject", |v| from_value(v).map(KnownObject::GameObject)),
    ("Transform", |v| from_value(v).map(KnownObject::Transform)),
    ("MonoBehaviour", |v| from_value(v).map(KnownObject::MonoBehaviour)),
    ("MonoScript", |v| from_value(v).map(KnownObject::MonoScript)),
    ("TextAsset", |v| from_value(v).map(KnownObject::TextAsset)),
    ("Texture2D", |v| from_value(v).map(KnownObject::Texture2D)),
    ("StreamingInfo", |v| from_value(v).map(KnownObject::StreamingInfo)),
    ("StreamedResource", |v| from_value(v).map(KnownObject::StreamedResource)),
];

/// Reads a record through the view registered for its type name, if there is one.
pub fn view(value: &Value) -> Option<Result<KnownObject>> {
    let object = value.as_record()?;
    let (_, view) = VIEWS.iter().find(|(name, _)| *name == object.type_name)?;
    Some(view(value))
}
