#![allow(non_snake_case)]

use std::borrow::Cow;

use serde::de::{Deserializer, SeqAccess, Visitor};
use serde_derive::{Deserialize, Serialize};

use crate::value::PPtrRef;

/// Engine class of a view.
pub trait ClassIdType {
    const CLASS_ID: i32;
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GameObject {
    pub m_Component: Vec<ComponentPair>,
    pub m_Layer: u32,
    pub m_Name: String,
    pub m_Tag: u16,
    pub m_IsActive: bool,
}
impl ClassIdType for GameObject {
    const CLASS_ID: i32 = 1;
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct ComponentPair {
    pub component: PPtrRef,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Transform {
    pub m_GameObject: PPtrRef,
    pub m_LocalRotation: (f32, f32, f32, f32),
    pub m_LocalPosition: (f32, f32, f32),
    pub m_LocalScale: (f32, f32, f32),
    pub m_Children: Vec<PPtrRef>,
    pub m_Father: PPtrRef,
}
impl ClassIdType for Transform {
    const CLASS_ID: i32 = 4;
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MonoBehaviour {
    pub m_GameObject: PPtrRef,
    pub m_Enabled: bool,
    pub m_Script: PPtrRef,
    pub m_Name: String,
}
impl ClassIdType for MonoBehaviour {
    const CLASS_ID: i32 = 114;
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MonoScript {
    pub m_Name: String,
    pub m_ExecutionOrder: i32,
    pub m_PropertiesHash: [u8; 16],
    pub m_ClassName: String,
    pub m_Namespace: String,
    pub m_AssemblyName: String,
}
impl ClassIdType for MonoScript {
    const CLASS_ID: i32 = 115;
}

impl MonoScript {
    pub fn assembly_name(&self) -> Cow<'_, str> {
        match self.m_AssemblyName.ends_with(".dll") {
            true => Cow::Borrowed(&self.m_AssemblyName),
            false => Cow::Owned(format!("{}.dll", self.m_AssemblyName)),
        }
    }

    pub fn full_name(&self) -> Cow<'_, str> {
        match self.m_Namespace.is_empty() {
            true => Cow::Borrowed(&self.m_ClassName),
            false => Cow::Owned(format!("{}.{}", self.m_Namespace, self.m_ClassName)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TextAsset {
    pub m_Name: String,
    pub m_Script: Blob,
}
impl ClassIdType for TextAsset {
    const CLASS_ID: i32 = 49;
}

impl TextAsset {
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.m_Script.0)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Texture2D {
    pub m_Name: String,
    pub m_Width: i32,
    pub m_Height: i32,
    pub m_TextureFormat: i32,
    pub m_MipCount: i32,
    #[serde(rename = "image data")]
    pub image_data: Blob,
    pub m_StreamData: StreamingInfo,
}
impl ClassIdType for Texture2D {
    const CLASS_ID: i32 = 28;
}

/// Location of data in a `.resS` file.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct StreamingInfo {
    pub offset: u64,
    pub size: u32,
    pub path: String,
}

/// Location of data in a `.resource` file.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct StreamedResource {
    pub m_Source: String,
    pub m_Offset: u64,
    pub m_Size: u64,
}

/// Raw bytes, from either a byte array or a string.
#[derive(Debug, Serialize, Clone, Default, PartialEq, Eq)]
pub struct Blob(pub Vec<u8>);

impl<'de> serde::Deserialize<'de> for Blob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BlobVisitor;

        impl<'de> Visitor<'de> for BlobVisitor {
            type Value = Blob;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("bytes or a string")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Blob, E> {
                Ok(Blob(v.to_vec()))
            }

            fn visit_str<E>(self, v: &str) -> Result<Blob, E> {
                Ok(Blob(v.as_bytes().to_vec()))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Blob, A::Error> {
                let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(4096));
                while let Some(byte) = seq.next_element()? {
                    bytes.push(byte);
                }
                Ok(Blob(bytes))
            }
        }

        deserializer.deserialize_byte_buf(BlobVisitor)
    }
}
