// File: lnnfc-core/src/codec/ndef.rs
//
// NDEF records and the Type 2 tag TLV container around them.

use lnnfc_common::Error;

const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_CF: u8 = 0x20;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;

pub const TLV_NULL: u8 = 0x00;
pub const TLV_LOCK_CONTROL: u8 = 0x01;
pub const TLV_MEMORY_CONTROL: u8 = 0x02;
pub const TLV_NDEF: u8 = 0x03;
pub const TLV_PROPRIETARY: u8 = 0xFD;
pub const TLV_TERMINATOR: u8 = 0xFE;

/// NFC Forum URI RTD abbreviation table, indexed by identifier code.
pub const URI_PREFIXES: [&str; 36] = [
    "",
    "http://www.",
    "https://www.",
    "http://",
    "https://",
    "tel:",
    "mailto:",
    "ftp://anonymous:anonymous@",
    "ftp://ftp.",
    "ftps://",
    "sftp://",
    "smb://",
    "nfs://",
    "ftp://",
    "dav://",
    "news:",
    "telnet://",
    "imap:",
    "rtsp://",
    "urn:",
    "pop:",
    "sip:",
    "sips:",
    "tftp:",
    "btspp://",
    "btl2cap://",
    "btgoep://",
    "tcpobex://",
    "irdaobex://",
    "file://",
    "urn:epc:id:",
    "urn:epc:tag:",
    "urn:epc:pat:",
    "urn:epc:raw:",
    "urn:epc:",
    "urn:nfc:",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tnf {
    Empty = 0,
    WellKnown = 1,
    Media = 2,
    AbsoluteUri = 3,
    External = 4,
    Unknown = 5,
    Unchanged = 6,
    Reserved = 7,
}

impl Tnf {
    fn from_bits(bits: u8) -> Self {
        match bits & TNF_MASK {
            0 => Tnf::Empty,
            1 => Tnf::WellKnown,
            2 => Tnf::Media,
            3 => Tnf::AbsoluteUri,
            4 => Tnf::External,
            5 => Tnf::Unknown,
            6 => Tnf::Unchanged,
            _ => Tnf::Reserved,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefRecord {
    pub tnf: Tnf,
    pub record_type: Vec<u8>,
    pub id: Vec<u8>,
    pub payload: Vec<u8>,
}

impl NdefRecord {
    /// Well-known `U` record, abbreviated with the longest matching prefix.
    pub fn uri(uri: &str) -> Self {
        let (code, prefix) = URI_PREFIXES
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, p)| uri.starts_with(*p))
            .max_by_key(|(_, p)| p.len())
            .map(|(i, p)| (i as u8, *p))
            .unwrap_or((0, ""));

        let mut payload = Vec::with_capacity(1 + uri.len() - prefix.len());
        payload.push(code);
        payload.extend_from_slice(uri[prefix.len()..].as_bytes());

        Self {
            tnf: Tnf::WellKnown,
            record_type: b"U".to_vec(),
            id: Vec::new(),
            payload,
        }
    }

    /// Well-known `T` record with UTF-8 text.
    pub fn text(text: &str, lang: &str) -> Self {
        let lang = &lang.as_bytes()[..lang.len().min(0x3F)];
        let mut payload = Vec::with_capacity(1 + lang.len() + text.len());
        payload.push(lang.len() as u8);
        payload.extend_from_slice(lang);
        payload.extend_from_slice(text.as_bytes());

        Self {
            tnf: Tnf::WellKnown,
            record_type: b"T".to_vec(),
            id: Vec::new(),
            payload,
        }
    }

    /// Expanded URI for `U` records and absolute-URI records.
    pub fn as_uri(&self) -> Option<String> {
        match self.tnf {
            Tnf::WellKnown if self.record_type == b"U" => {
                let (&code, rest) = self.payload.split_first()?;
                // reserved identifier codes carry no prefix
                let prefix = URI_PREFIXES.get(code as usize).copied().unwrap_or("");
                let rest = std::str::from_utf8(rest).ok()?;
                Some(format!("{prefix}{rest}"))
            }
            Tnf::AbsoluteUri => String::from_utf8(self.record_type.clone()).ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        if self.tnf != Tnf::WellKnown || self.record_type != b"T" {
            return None;
        }
        let (&status, rest) = self.payload.split_first()?;
        // bit 7 set means UTF-16, which writers of this system never produce
        if status & 0x80 != 0 {
            return None;
        }
        let lang_len = (status & 0x3F) as usize;
        let text = rest.get(lang_len..)?;
        String::from_utf8(text.to_vec()).ok()
    }

    /// Short human-readable label, e.g. `uri`, `text` or `mime:image/png`.
    pub fn kind_name(&self) -> String {
        let ty = String::from_utf8_lossy(&self.record_type);
        match self.tnf {
            Tnf::Empty => "empty".into(),
            Tnf::WellKnown if self.record_type == b"U" => "uri".into(),
            Tnf::WellKnown if self.record_type == b"T" => "text".into(),
            Tnf::WellKnown => format!("well-known:{ty}"),
            Tnf::Media => format!("mime:{ty}"),
            Tnf::AbsoluteUri => "absolute-uri".into(),
            Tnf::External => format!("external:{ty}"),
            Tnf::Unknown => "unknown".into(),
            Tnf::Unchanged => "unchanged".into(),
            Tnf::Reserved => "reserved".into(),
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>, first: bool, last: bool) {
        let short = self.payload.len() < 256;
        let mut header = self.tnf as u8;
        if first {
            header |= FLAG_MB;
        }
        if last {
            header |= FLAG_ME;
        }
        if short {
            header |= FLAG_SR;
        }
        if !self.id.is_empty() {
            header |= FLAG_IL;
        }

        out.push(header);
        out.push(self.record_type.len() as u8);
        if short {
            out.push(self.payload.len() as u8);
        } else {
            out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        }
        if !self.id.is_empty() {
            out.push(self.id.len() as u8);
        }
        out.extend_from_slice(&self.record_type);
        out.extend_from_slice(&self.id);
        out.extend_from_slice(&self.payload);
    }
}

/// Ordered NDEF records as stored on one tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMessage {
    records: Vec<NdefRecord>,
}

impl TagMessage {
    pub fn new(records: Vec<NdefRecord>) -> Self {
        Self { records }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[NdefRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn uris(&self) -> impl Iterator<Item = String> + '_ {
        self.records.iter().filter_map(NdefRecord::as_uri)
    }

    /// Bare NDEF message bytes, without the TLV wrapper.
    pub fn to_ndef_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let last = self.records.len().saturating_sub(1);
        for (i, record) in self.records.iter().enumerate() {
            record.encode_into(&mut out, i == 0, i == last);
        }
        out
    }

    /// Tag memory image: `03 <len> <ndef> FE`.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let ndef = self.to_ndef_bytes();
        if ndef.len() > 0xFFFE {
            return Err(Error::Codec(format!(
                "NDEF message of {} bytes does not fit a TLV",
                ndef.len()
            )));
        }

        let mut out = Vec::with_capacity(ndef.len() + 5);
        out.push(TLV_NDEF);
        if ndef.len() < 0xFF {
            out.push(ndef.len() as u8);
        } else {
            out.push(0xFF);
            out.extend_from_slice(&(ndef.len() as u16).to_be_bytes());
        }
        out.extend_from_slice(&ndef);
        out.push(TLV_TERMINATOR);
        Ok(out)
    }

    /// Parses either a TLV memory image or a bare NDEF message.
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        match data.first() {
            None => Ok(Self::empty()),
            Some(&(TLV_NULL | TLV_LOCK_CONTROL | TLV_MEMORY_CONTROL | TLV_NDEF | TLV_PROPRIETARY | TLV_TERMINATOR)) => {
                match find_ndef_tlv(data)? {
                    Some(ndef) => Self::from_ndef_bytes(ndef),
                    None => Ok(Self::empty()),
                }
            }
            Some(&b) if b & FLAG_MB != 0 => Self::from_ndef_bytes(data),
            Some(&b) => Err(Error::Codec(format!("unrecognised tag layout (first byte 0x{b:02x})"))),
        }
    }

    pub fn from_ndef_bytes(data: &[u8]) -> Result<Self, Error> {
        let mut records = Vec::new();
        let mut cursor = Cursor { data, pos: 0 };

        while !cursor.is_done() {
            let header = cursor.byte("record header")?;
            if header & FLAG_CF != 0 {
                return Err(Error::Codec("chunked NDEF records are not supported".into()));
            }
            let type_len = cursor.byte("type length")? as usize;
            let payload_len = if header & FLAG_SR != 0 {
                cursor.byte("payload length")? as usize
            } else {
                let b = cursor.take(4, "payload length")?;
                u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize
            };
            let id_len = if header & FLAG_IL != 0 {
                cursor.byte("id length")? as usize
            } else {
                0
            };

            let record_type = cursor.take(type_len, "record type")?.to_vec();
            let id = cursor.take(id_len, "record id")?.to_vec();
            let payload = cursor.take(payload_len, "payload")?.to_vec();

            let tnf = Tnf::from_bits(header);
            if tnf != Tnf::Empty {
                records.push(NdefRecord { tnf, record_type, id, payload });
            }

            if header & FLAG_ME != 0 {
                break;
            }
        }

        Ok(Self { records })
    }
}

/// Locates the first NDEF TLV value. `None` for blank or terminated memory.
fn find_ndef_tlv(data: &[u8]) -> Result<Option<&[u8]>, Error> {
    let mut i = 0;
    while i < data.len() {
        let tlv_type = data[i];
        match tlv_type {
            TLV_NULL => {
                i += 1;
                continue;
            }
            TLV_TERMINATOR => return Ok(None),
            _ => {}
        }

        let (len, header) = match data.get(i + 1) {
            None => return Err(Error::Codec(format!("TLV 0x{tlv_type:02x} truncated before its length"))),
            Some(0xFF) => match data.get(i + 2..i + 4) {
                Some(b) => (u16::from_be_bytes([b[0], b[1]]) as usize, 4),
                None => return Err(Error::Codec("TLV three-byte length truncated".into())),
            },
            Some(&l) => (l as usize, 2),
        };

        let start = i + header;
        let end = start + len;
        if end > data.len() {
            return Err(Error::Codec(format!(
                "TLV 0x{tlv_type:02x} declares {len} bytes but only {} remain",
                data.len() - start.min(data.len())
            )));
        }
        if tlv_type == TLV_NDEF {
            return Ok(Some(&data[start..end]));
        }
        i = end;
    }
    Ok(None)
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn is_done(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn byte(&mut self, what: &str) -> Result<u8, Error> {
        Ok(self.take(1, what)?[0])
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], Error> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.data.len());
        match end {
            Some(end) => {
                let slice = &self.data[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(Error::Codec(format!(
                "{what} overruns the buffer ({n} bytes at offset {}, {} total)",
                self.pos,
                self.data.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_record_uses_longest_prefix() {
        let rec = NdefRecord::uri("https://www.example.com/x");
        assert_eq!(rec.payload[0], 0x02);
        assert_eq!(&rec.payload[1..], b"example.com/x");

        let rec = NdefRecord::uri("https://lnbits.example/withdraw/api/v1/lnurl/abc");
        assert_eq!(rec.payload[0], 0x04);

        let rec = NdefRecord::uri("lightning:LNURL1DP68");
        assert_eq!(rec.payload[0], 0x00);
        assert_eq!(rec.as_uri().as_deref(), Some("lightning:LNURL1DP68"));
    }

    #[test]
    fn tlv_image_layout() {
        let msg = TagMessage::new(vec![NdefRecord::uri("https://a.b/c")]);
        let bytes = msg.to_bytes().unwrap();
        // D1 01 06 55 04 "a.b/c"
        assert_eq!(bytes[0], TLV_NDEF);
        assert_eq!(bytes[1] as usize, bytes.len() - 3);
        assert_eq!(bytes[2], 0xD1);
        assert_eq!(&bytes[3..6], &[0x01, 0x06, b'U']);
        assert_eq!(*bytes.last().unwrap(), TLV_TERMINATOR);

        let back = TagMessage::from_bytes(&bytes).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn long_message_uses_three_byte_length() {
        let url = format!("https://example.com/{}", "a".repeat(300));
        let msg = TagMessage::new(vec![NdefRecord::uri(&url)]);
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(bytes[1], 0xFF);
        let len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        assert_eq!(len, bytes.len() - 5);
        // payload >= 256 forces a long record header
        assert_eq!(bytes[4] & FLAG_SR, 0);

        let back = TagMessage::from_bytes(&bytes).unwrap();
        assert_eq!(back.uris().next().as_deref(), Some(url.as_str()));
    }

    #[test]
    fn raw_ndef_is_accepted() {
        let msg = TagMessage::new(vec![NdefRecord::uri("https://a.b/c")]);
        let back = TagMessage::from_bytes(&msg.to_ndef_bytes()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn blank_and_cleared_memory_is_empty() {
        assert!(TagMessage::from_bytes(&[]).unwrap().is_empty());
        assert!(TagMessage::from_bytes(&[0, 0, 0, 0]).unwrap().is_empty());
        assert!(TagMessage::from_bytes(&[0x03, 0x00, 0xFE, 0x00]).unwrap().is_empty());
        assert!(TagMessage::from_bytes(&[0xFE]).unwrap().is_empty());
        // NFC Forum empty record
        assert!(TagMessage::from_bytes(&[0x03, 0x03, 0xD0, 0x00, 0x00, 0xFE]).unwrap().is_empty());
    }

    #[test]
    fn lock_control_tlv_is_skipped() {
        let msg = TagMessage::new(vec![NdefRecord::uri("https://a.b/c")]);
        let mut bytes = vec![TLV_LOCK_CONTROL, 0x03, 0xA0, 0x10, 0x44];
        bytes.extend(msg.to_bytes().unwrap());
        assert_eq!(TagMessage::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn structural_damage_is_a_codec_error() {
        // TLV length runs past the end
        assert!(matches!(TagMessage::from_bytes(&[0x03, 0x20, 0xD1]), Err(Error::Codec(_))));
        // length byte missing
        assert!(matches!(TagMessage::from_bytes(&[0x03]), Err(Error::Codec(_))));
        // record payload length overruns the NDEF value
        assert!(matches!(
            TagMessage::from_bytes(&[0x03, 0x04, 0xD1, 0x01, 0x09, b'U', 0xFE]),
            Err(Error::Codec(_))
        ));
        // chunked record
        assert!(matches!(
            TagMessage::from_ndef_bytes(&[0xB1, 0x01, 0x01, b'U', 0x04]),
            Err(Error::Codec(_))
        ));
    }

    #[test]
    fn text_records_are_named_but_carry_no_uri() {
        let msg = TagMessage::new(vec![NdefRecord::text("hello", "en")]);
        let back = TagMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(back.records()[0].kind_name(), "text");
        assert_eq!(back.records()[0].as_text().as_deref(), Some("hello"));
        assert_eq!(back.uris().count(), 0);
    }
}
