use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Serialize, Serializer};
use std::fmt;
use std::io::Read;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::diag::{DiagnosticKind, Diagnostics};
use crate::error::{EdbError, Result};

/// Length of the fixed header region at offset 0.
pub const FIXED_LEN: usize = 0x68;
/// Start of the variable-length origin region.
pub const ORIGIN_OFF: usize = 0x85C;
/// The only `file_version` whose layout is known.
pub const SUPPORTED_FILE_VERSION: u32 = 3;
pub const GUID_LEN: usize = 24;
const RESERVED_LEN: usize = 32;
const MAX_ORIGIN_STRING: u32 = 4096;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Guid(pub [u8; GUID_LEN]);

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({self})")
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// Who wrote the database, where, and when. Informational only.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Origin {
    pub build: String,
    pub host: String,
    pub user: String,
    pub edit_time: u32,
    /// `edit_time` rendered as RFC 3339, when representable.
    pub edited: Option<String>,
    pub process_id: u32,
    pub os: String,
    pub product: String,
    pub original_path: String,
    pub settings_path: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct DatabaseHeader {
    pub file_version: u32,
    pub producer_version: u32,
    pub database_guid: Guid,
    pub session_guid: Guid,
    pub num_files: u32,
    pub num_lists: u32,
    pub first_list: u32,
    pub filesize: u32,
    #[serde(skip)]
    pub reserved: [u8; RESERVED_LEN],
    pub origin: Option<Origin>,
}

impl DatabaseHeader {
    /// Parse the header from the start of the archive image.
    ///
    /// Only a buffer shorter than the fixed region is an error; every other
    /// inconsistency is recorded in `diags`.
    pub fn read_from(buf: &[u8], diags: &mut Diagnostics) -> Result<Self> {
        if buf.len() < FIXED_LEN {
            return Err(EdbError::TooSmall {
                len: buf.len() as u64,
                need: FIXED_LEN as u64,
            });
        }
        let mut r = &buf[..FIXED_LEN];
        let file_version = r.read_u32::<LittleEndian>()?;
        let producer_version = r.read_u32::<LittleEndian>()?;
        let mut database_guid = [0u8; GUID_LEN];
        r.read_exact(&mut database_guid)?;
        let mut session_guid = [0u8; GUID_LEN];
        r.read_exact(&mut session_guid)?;
        let num_files = r.read_u32::<LittleEndian>()?;
        let num_lists = r.read_u32::<LittleEndian>()?;
        let first_list = r.read_u32::<LittleEndian>()?;
        let filesize = r.read_u32::<LittleEndian>()?;
        let mut reserved = [0u8; RESERVED_LEN];
        r.read_exact(&mut reserved)?;

        if file_version == SUPPORTED_FILE_VERSION {
            if filesize as usize != buf.len() {
                diags.structural(format!(
                    "header filesize {filesize} does not match archive length {}",
                    buf.len()
                ));
            }
        } else {
            diags.push(
                DiagnosticKind::UnsupportedVersion,
                format!(
                    "file version {file_version} is not {SUPPORTED_FILE_VERSION}; layout may differ"
                ),
            );
        }

        let origin = match buf.get(ORIGIN_OFF..) {
            None | Some([]) => None,
            Some(region) => match read_origin(region) {
                Ok(o) => Some(o),
                Err(e) => {
                    diags.push(
                        DiagnosticKind::Warning,
                        format!("origin region at {ORIGIN_OFF:#x} unreadable: {e}"),
                    );
                    None
                }
            },
        };

        tracing::debug!(
            file_version,
            producer_version,
            num_files,
            num_lists,
            first_list = format_args!("{first_list:#x}"),
            "database header"
        );

        Ok(Self {
            file_version,
            producer_version,
            database_guid: Guid(database_guid),
            session_guid: Guid(session_guid),
            num_files,
            num_lists,
            first_list,
            filesize,
            reserved,
            origin,
        })
    }

    pub fn is_supported(&self) -> bool {
        self.file_version == SUPPORTED_FILE_VERSION
    }
}

fn read_origin(mut r: &[u8]) -> Result<Origin> {
    let build = read_string(&mut r)?;
    let host = read_string(&mut r)?;
    let user = read_string(&mut r)?;
    let edit_time = r.read_u32::<LittleEndian>()?;
    let process_id = r.read_u32::<LittleEndian>()?;
    let os = read_string(&mut r)?;
    let product = read_string(&mut r)?;
    let original_path = read_string(&mut r)?;
    let settings_path = read_string(&mut r)?;
    let edited = OffsetDateTime::from_unix_timestamp(i64::from(edit_time))
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok());
    Ok(Origin {
        build,
        host,
        user,
        edit_time,
        edited,
        process_id,
        os,
        product,
        original_path,
        settings_path,
    })
}

fn read_string(r: &mut &[u8]) -> Result<String> {
    let len = r.read_u32::<LittleEndian>()?;
    if len > MAX_ORIGIN_STRING {
        return Err(EdbError::Format(format!("origin string length {len}")));
    }
    let mut bytes = vec![0u8; len as usize];
    r.read_exact(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn fixed(version: u32, filesize: u32) -> Vec<u8> {
        let mut v = Vec::new();
        v.write_u32::<LittleEndian>(version).unwrap();
        v.write_u32::<LittleEndian>(17).unwrap();
        v.extend_from_slice(&[0xAB; GUID_LEN]);
        v.extend_from_slice(&[0xCD; GUID_LEN]);
        for x in [2u32, 1, 0x1000, filesize] {
            v.write_u32::<LittleEndian>(x).unwrap();
        }
        v.resize(FIXED_LEN, 0);
        v
    }

    #[test]
    fn parses_fixed_region() {
        let buf = fixed(SUPPORTED_FILE_VERSION, FIXED_LEN as u32);
        let mut diags = Diagnostics::new();
        let h = DatabaseHeader::read_from(&buf, &mut diags).unwrap();
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(h.num_files, 2);
        assert_eq!(h.num_lists, 1);
        assert_eq!(h.first_list, 0x1000);
        assert_eq!(h.database_guid.to_string(), "ab".repeat(GUID_LEN));
        assert!(h.origin.is_none());
    }

    #[test]
    fn filesize_checked_only_for_supported_version() {
        let mut diags = Diagnostics::new();
        DatabaseHeader::read_from(&fixed(SUPPORTED_FILE_VERSION, 999), &mut diags).unwrap();
        assert_eq!(diags.count(DiagnosticKind::Structural), 1);

        let mut diags = Diagnostics::new();
        DatabaseHeader::read_from(&fixed(9, 999), &mut diags).unwrap();
        assert_eq!(diags.count(DiagnosticKind::Structural), 0);
        assert_eq!(diags.count(DiagnosticKind::UnsupportedVersion), 1);
    }

    #[test]
    fn short_buffer_is_fatal() {
        let mut diags = Diagnostics::new();
        let err = DatabaseHeader::read_from(&[0u8; 10], &mut diags).unwrap_err();
        assert!(matches!(err, EdbError::TooSmall { len: 10, .. }));
    }

    #[test]
    fn origin_region_is_decoded() {
        let mut buf = fixed(SUPPORTED_FILE_VERSION, 0);
        buf.resize(ORIGIN_OFF, 0);
        let put = |s: &str, v: &mut Vec<u8>| {
            v.write_u32::<LittleEndian>(s.len() as u32).unwrap();
            v.extend_from_slice(s.as_bytes());
        };
        put("build 42", &mut buf);
        put("bench", &mut buf);
        put("alice", &mut buf);
        buf.write_u32::<LittleEndian>(0).unwrap();
        buf.write_u32::<LittleEndian>(4242).unwrap();
        for s in ["os", "product", "C:\\proj\\a.db", "C:\\settings"] {
            put(s, &mut buf);
        }
        let len = buf.len() as u32;
        buf[0x44..0x48].copy_from_slice(&len.to_le_bytes());

        let mut diags = Diagnostics::new();
        let h = DatabaseHeader::read_from(&buf, &mut diags).unwrap();
        assert!(diags.is_empty(), "{diags:?}");
        let o = h.origin.unwrap();
        assert_eq!(o.user, "alice");
        assert_eq!(o.process_id, 4242);
        assert_eq!(o.edited.as_deref(), Some("1970-01-01T00:00:00Z"));
        assert_eq!(o.settings_path, "C:\\settings");
    }

    #[test]
    fn corrupt_origin_is_a_warning() {
        let mut buf = fixed(SUPPORTED_FILE_VERSION, 0);
        buf.resize(ORIGIN_OFF, 0);
        buf.extend_from_slice(&u32::MAX.to_le_bytes());
        let len = buf.len() as u32;
        buf[0x44..0x48].copy_from_slice(&len.to_le_bytes());
        let mut diags = Diagnostics::new();
        let h = DatabaseHeader::read_from(&buf, &mut diags).unwrap();
        assert!(h.origin.is_none());
        assert_eq!(diags.count(DiagnosticKind::Warning), 1);
    }
}
