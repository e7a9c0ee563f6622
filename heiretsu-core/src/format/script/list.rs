use super::reader::{ensure, read_u32};
use crate::error::Result;

const LIST_HEADER_SIZE: usize = 8;
const LIST_RECORD_SIZE: usize = 36;

/// Parse the script list: a u32 count, 4 unused bytes, then fixed 36-byte
/// records each holding a NUL-terminated ASCII script name.
pub fn parse_script_list(bytes: &[u8]) -> Result<Vec<String>> {
    let count = read_u32(bytes, 0)? as usize;
    let mut names = Vec::with_capacity(count.min(bytes.len() / LIST_RECORD_SIZE));

    for i in 0..count {
        let off = LIST_HEADER_SIZE + i * LIST_RECORD_SIZE;
        ensure(bytes, off, 1)?;
        let record = &bytes[off..(off + LIST_RECORD_SIZE).min(bytes.len())];
        let end = record.iter().position(|&b| b == 0).unwrap_or(record.len());
        names.push(String::from_utf8_lossy(&record[..end]).into_owned());
    }

    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScriptError;
    use pretty_assertions::assert_eq;

    fn list(names: &[&str]) -> Vec<u8> {
        let mut out = (names.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(&[0; 4]);
        for name in names {
            let mut record = [0u8; LIST_RECORD_SIZE];
            record[..name.len()].copy_from_slice(name.as_bytes());
            out.extend_from_slice(&record);
        }
        out
    }

    #[test]
    fn names_in_order() {
        assert_eq!(
            parse_script_list(&list(&["S01A", "S01B", "EV_OPENING"])).unwrap(),
            vec!["S01A", "S01B", "EV_OPENING"]
        );
        assert!(parse_script_list(&list(&[])).unwrap().is_empty());
    }

    #[test]
    fn missing_records_are_eof() {
        let mut bytes = list(&["S01A"]);
        bytes[3] = 2;
        assert!(matches!(
            parse_script_list(&bytes),
            Err(ScriptError::UnexpectedEof { .. })
        ));
    }
}
