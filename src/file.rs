//! Marker segment parser for JPEG streams.
//!
//! [`JpegParser`] walks the segments between SOI and the first scan header. Scan data is left
//! untouched and can be retrieved with [`JpegParser::remaining`].

#![allow(non_snake_case)]


use std::{fmt, mem};

use bytemuck::{AnyBitPattern, Pod, Zeroable};

use crate::error::{Error, Result};

/// Natural-order position of each coefficient, indexed by its zig-zag position.
pub const ZIGZAG: [u8; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27, 20,
    13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58, 59,
    52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

pub struct JpegParser<'a> {
    cursor: Cursor<'a>,
    finished: bool,
}

impl<'a> JpegParser<'a> {
    pub fn new(jpeg: &'a [u8]) -> Result<Self> {
        let mut cursor = Cursor::new(jpeg);
        if cursor.array::<2>()? != [0xFF, 0xD8] {
            return Err(Error::malformed("stream does not start with an SOI marker"));
        }
        Ok(Self {
            cursor,
            finished: false,
        })
    }

    /// Returns the next marker segment.
    ///
    /// `Ok(None)` is returned at EOI and for every call following the SOS segment.
    pub fn next_segment(&mut self) -> Result<Option<Segment<'a>>> {
        if self.finished {
            return Ok(None);
        }

        let (offset, marker) = self.cursor.marker()?;
        match marker {
            0x00 => return Err(Error::malformed("found stuffed ff 00 where a marker was expected")),
            0xD9 => {
                let trailing = self.cursor.rest().len();
                if trailing != 0 {
                    log::warn!("{trailing} bytes follow the EOI marker");
                }
                self.finished = true;
                return Ok(None);
            }
            0x01 | 0xD0..=0xD8 => {
                return Err(Error::malformed(format!(
                    "marker ff {marker:02x} without payload is not allowed before the first scan"
                )));
            }
            _ => {}
        }

        let length = self.cursor.u16()?;
        if length < 2 {
            return Err(Error::malformed(format!("ff {marker:02x} segment has length {length}")));
        }
        let body = self.cursor.take(usize::from(length - 2))?;

        let mut cursor = Cursor::new(body);
        let kind = match marker {
            0xDB => Some(SegmentKind::Dqt(parse_dqt(&mut cursor)?)),
            0xDD => Some(SegmentKind::Dri(Dri {
                Ri: u16::from_be_bytes(cursor.array()?),
            })),
            0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                Some(SegmentKind::Sof(parse_sof(marker, &mut cursor)?))
            }
            0xDA => {
                self.finished = true;
                Some(SegmentKind::Sos(parse_sos(&mut cursor)?))
            }
            0xE0 => parse_jfif(&mut cursor)?.map(SegmentKind::Jfif),
            0xFE => Some(SegmentKind::Com(Com(cursor.take(body.len())?))),
            _ => None,
        };

        // Application data past a known header is not ours to check.
        let unread = cursor.rest().len();
        if unread != 0 && kind.is_some() && !matches!(marker, 0xE0..=0xEF) {
            log::warn!("ignoring {unread} unread bytes at the end of the ff {marker:02x} segment");
        }

        Ok(Some(Segment {
            offset,
            marker,
            body,
            kind,
        }))
    }

    /// Returns the bytes that have not been parsed yet.
    ///
    /// Once the SOS segment was returned, these start with the entropy-coded data of the first
    /// scan.
    pub fn remaining(&self) -> &'a [u8] {
        self.cursor.rest()
    }
}

fn parse_dqt(cursor: &mut Cursor<'_>) -> Result<Dqt> {
    let mut tables = Vec::new();
    while !cursor.rest().is_empty() {
        let PqTq = cursor.u8()?;
        let mut Qk = [0; 64];
        match PqTq >> 4 {
            0 => {
                for (q, &byte) in Qk.iter_mut().zip(cursor.take(64)?) {
                    *q = u16::from(byte);
                }
            }
            1 => {
                for (q, pair) in Qk.iter_mut().zip(cursor.take(128)?.chunks_exact(2)) {
                    *q = u16::from_be_bytes([pair[0], pair[1]]);
                }
            }
            Pq => {
                return Err(Error::malformed(format!(
                    "DQT table uses unknown element precision {Pq}"
                )))
            }
        }
        tables.push(DqtTable { PqTq, Qk });
    }
    Ok(Dqt(tables))
}

fn parse_sof<'a>(marker: u8, cursor: &mut Cursor<'a>) -> Result<Sof<'a>> {
    let header = *cursor.obj::<FrameHeader>()?;
    let components = cursor.objs(header.Nf.into())?;
    Ok(Sof {
        marker: SofMarker(marker),
        header,
        components,
    })
}

fn parse_sos<'a>(cursor: &mut Cursor<'a>) -> Result<Sos<'a>> {
    let Ns = cursor.u8()?;
    let components = cursor.objs(Ns.into())?;
    let [Ss, Se, AhAl] = cursor.array::<3>()?;
    Ok(Sos {
        components,
        Ss,
        Se,
        AhAl,
    })
}

fn parse_jfif(cursor: &mut Cursor<'_>) -> Result<Option<Jfif>> {
    const IDENTIFIER: &[u8] = b"JFIF\0";

    if !cursor.rest().starts_with(IDENTIFIER) {
        return Ok(None);
    }
    cursor.take(IDENTIFIER.len())?;

    let jfif = *cursor.obj::<Jfif>()?;
    if jfif.units > 2 {
        return Err(Error::malformed(format!(
            "JFIF header uses unknown density unit {}",
            jfif.units
        )));
    }
    // Thumbnail pixels are skipped, but have to be present.
    let thumbnail_len = 3 * usize::from(jfif.Xthumbnail) * usize::from(jfif.Ythumbnail);
    cursor.take(thumbnail_len)?;
    Ok(Some(jfif))
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let bytes = self.rest().get(..count).ok_or_else(truncated)?;
        self.pos += count;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        let [byte] = self.array::<1>()?;
        Ok(byte)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn objs<T: AnyBitPattern>(&mut self, count: usize) -> Result<&'a [T]> {
        assert_eq!(mem::align_of::<T>(), 1);
        Ok(bytemuck::cast_slice(self.take(count * mem::size_of::<T>())?))
    }

    fn obj<T: AnyBitPattern>(&mut self) -> Result<&'a T> {
        Ok(&self.objs::<T>(1)?[0])
    }

    /// Skips to the next `0xFF 0xXX` marker and returns its offset and marker byte.
    ///
    /// Fill bytes in front of the marker byte are consumed, the offset points at the last one.
    fn marker(&mut self) -> Result<(usize, u8)> {
        let mut skipped = 0;
        while self.u8()? != 0xFF {
            skipped += 1;
        }
        if skipped != 0 {
            log::warn!("skipped {skipped} bytes of garbage in front of a marker");
        }
        loop {
            match self.u8()? {
                0xFF => continue,
                marker => return Ok((self.pos - 2, marker)),
            }
        }
    }
}

fn truncated() -> Error {
    Error::malformed("unexpected end of JPEG data")
}

/// A marker segment: the `0xFF 0xXX` marker, a 2-byte length and the segment body.
#[derive(Debug)]
pub struct Segment<'a> {
    offset: usize,
    marker: u8,
    body: &'a [u8],
    kind: Option<SegmentKind<'a>>,
}

impl<'a> Segment<'a> {
    /// Position of the marker in the parsed buffer.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn marker(&self) -> u8 {
        self.marker
    }

    /// The segment body, without marker and length.
    #[inline]
    pub fn raw_bytes(&self) -> &'a [u8] {
        self.body
    }

    /// Size of the whole segment in the stream.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        4 + self.body.len()
    }

    /// The decoded body, or `None` for segments this parser does not decode.
    #[inline]
    pub fn as_segment_kind(&self) -> Option<&SegmentKind<'a>> {
        self.kind.as_ref()
    }

    #[inline]
    pub fn into_segment_kind(self) -> Option<SegmentKind<'a>> {
        self.kind
    }
}

/// Decoded segment bodies.
#[derive(Debug)]
#[non_exhaustive]
pub enum SegmentKind<'a> {
    /// An APP0 segment carrying a JFIF header.
    Jfif(Jfif),
    Dqt(Dqt),
    Dri(Dri),
    Sof(Sof<'a>),
    Sos(Sos<'a>),
    Com(Com<'a>),
}

/// The fixed part of a JFIF header, following the `JFIF\0` identifier.
#[derive(Clone, Copy, Zeroable, Pod)]
#[repr(C)]
pub struct Jfif {
    version: [u8; 2],
    units: u8,
    Xdensity: [u8; 2],
    Ydensity: [u8; 2],
    Xthumbnail: u8,
    Ythumbnail: u8,
}

impl Jfif {
    #[inline]
    pub fn major_version(&self) -> u8 {
        self.version[0]
    }

    #[inline]
    pub fn minor_version(&self) -> u8 {
        self.version[1]
    }

    /// Density unit code: 0 for an aspect ratio only, 1 for dots per inch, 2 for dots per cm.
    #[inline]
    pub fn units(&self) -> u8 {
        self.units
    }

    #[inline]
    pub fn density_x(&self) -> u16 {
        u16::from_be_bytes(self.Xdensity)
    }

    #[inline]
    pub fn density_y(&self) -> u16 {
        u16::from_be_bytes(self.Ydensity)
    }

    #[inline]
    pub fn thumbnail_width(&self) -> u8 {
        self.Xthumbnail
    }

    #[inline]
    pub fn thumbnail_height(&self) -> u8 {
        self.Ythumbnail
    }
}

impl fmt::Debug for Jfif {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jfif")
            .field(
                "version",
                &format_args!("{}.{:02}", self.major_version(), self.minor_version()),
            )
            .field("units", &self.units)
            .field("density", &(self.density_x(), self.density_y()))
            .field("thumbnail", &(self.Xthumbnail, self.Ythumbnail))
            .finish()
    }
}

pub struct Com<'a>(&'a [u8]);

impl<'a> Com<'a> {
    /// The comment, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(self.0).into_owned()
    }
}

impl<'a> fmt::Debug for Com<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Com(\"{}\")", self.0.escape_ascii())
    }
}

/// One table of a DQT segment.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DqtTable {
    PqTq: u8,
    Qk: [u16; 64],
}

impl DqtTable {
    /// Element precision: 0 for 8-bit entries, 1 for 16-bit entries.
    #[inline]
    pub fn Pq(&self) -> u8 {
        self.PqTq >> 4
    }

    /// Table slot (0-3).
    #[inline]
    pub fn Tq(&self) -> u8 {
        self.PqTq & 0xf
    }

    /// Entries in zig-zag order, as stored.
    #[inline]
    pub fn Qk(&self) -> &[u16; 64] {
        &self.Qk
    }

    /// Entries in natural (row-major) order.
    pub fn natural_order(&self) -> [u16; 64] {
        let mut out = [0; 64];
        for (&q, &pos) in self.Qk.iter().zip(&ZIGZAG) {
            out[usize::from(pos)] = q;
        }
        out
    }
}

impl fmt::Debug for DqtTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DqtTable")
            .field("Pq", &self.Pq())
            .field("Tq", &self.Tq())
            .field("Qk", &self.Qk)
            .finish()
    }
}

/// Define Quantization Tables.
#[derive(Debug)]
pub struct Dqt(Vec<DqtTable>);

impl Dqt {
    #[inline]
    pub fn tables(&self) -> impl Iterator<Item = &DqtTable> {
        self.0.iter()
    }
}

/// Define Restart Interval. `Ri` is the number of MCUs per interval, 0 disables restart markers.
#[derive(Debug, Clone, Copy)]
pub struct Dri {
    Ri: u16,
}

impl Dri {
    #[inline]
    pub fn Ri(&self) -> u16 {
        self.Ri
    }
}

#[derive(Clone, Copy, Zeroable, Pod)]
#[repr(C)]
struct FrameHeader {
    P: u8,
    Y: [u8; 2],
    X: [u8; 2],
    Nf: u8,
}

/// Start Of Frame.
pub struct Sof<'a> {
    marker: SofMarker,
    header: FrameHeader,
    components: &'a [FrameComponent],
}

impl<'a> Sof<'a> {
    #[inline]
    pub fn sof(&self) -> SofMarker {
        self.marker
    }

    /// Sample precision in bits.
    #[inline]
    pub fn P(&self) -> u8 {
        self.header.P
    }

    /// Number of lines.
    #[inline]
    pub fn Y(&self) -> u16 {
        u16::from_be_bytes(self.header.Y)
    }

    /// Samples per line.
    #[inline]
    pub fn X(&self) -> u16 {
        u16::from_be_bytes(self.header.X)
    }

    #[inline]
    pub fn components(&self) -> &'a [FrameComponent] {
        self.components
    }
}

impl<'a> fmt::Debug for Sof<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sof")
            .field("marker", &self.marker)
            .field("P", &self.P())
            .field("Y", &self.Y())
            .field("X", &self.X())
            .field("components", &self.components)
            .finish()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SofMarker(u8);

impl SofMarker {
    /// The coding process, which is the `n` of `SOFn`.
    pub fn process(self) -> Option<u8> {
        match self.0 {
            0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => Some(self.0 - 0xC0),
            _ => None,
        }
    }
}

impl fmt::Debug for SofMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.process() {
            Some(n) => write!(f, "SOF{n}"),
            None => write!(f, "SofMarker(ff {:02x})", self.0),
        }
    }
}

#[derive(Clone, Copy, Zeroable, Pod)]
#[repr(C)]
pub struct FrameComponent {
    Ci: u8,
    HiVi: u8,
    Tqi: u8,
}

impl FrameComponent {
    /// Component identifier, referenced by scan headers.
    #[inline]
    pub fn Ci(&self) -> u8 {
        self.Ci
    }

    #[inline]
    pub fn Hi(&self) -> u8 {
        self.HiVi >> 4
    }

    #[inline]
    pub fn Vi(&self) -> u8 {
        self.HiVi & 0xf
    }

    /// Quantization table slot.
    #[inline]
    pub fn Tqi(&self) -> u8 {
        self.Tqi
    }
}

impl fmt::Debug for FrameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameComponent")
            .field("Ci", &self.Ci)
            .field("Hi", &self.Hi())
            .field("Vi", &self.Vi())
            .field("Tqi", &self.Tqi)
            .finish()
    }
}

/// Start Of Scan header.
pub struct Sos<'a> {
    components: &'a [ScanComponent],
    Ss: u8,
    Se: u8,
    AhAl: u8,
}

impl<'a> Sos<'a> {
    #[inline]
    pub fn components(&self) -> &'a [ScanComponent] {
        self.components
    }

    /// First coefficient of the spectral selection.
    #[inline]
    pub fn Ss(&self) -> u8 {
        self.Ss
    }

    /// Last coefficient of the spectral selection.
    #[inline]
    pub fn Se(&self) -> u8 {
        self.Se
    }

    #[inline]
    pub fn Ah(&self) -> u8 {
        self.AhAl >> 4
    }

    #[inline]
    pub fn Al(&self) -> u8 {
        self.AhAl & 0xf
    }
}

impl<'a> fmt::Debug for Sos<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sos")
            .field("components", &self.components)
            .field("Ss", &self.Ss)
            .field("Se", &self.Se)
            .field("Ah", &self.Ah())
            .field("Al", &self.Al())
            .finish()
    }
}

#[derive(Clone, Copy, Zeroable, Pod)]
#[repr(C)]
pub struct ScanComponent {
    Csj: u8,
    TdjTaj: u8,
}

impl ScanComponent {
    /// The `Ci` of the frame component this scan component refers to.
    #[inline]
    pub fn Csj(&self) -> u8 {
        self.Csj
    }

    /// DC Huffman table slot.
    #[inline]
    pub fn Tdj(&self) -> u8 {
        self.TdjTaj >> 4
    }

    /// AC Huffman table slot.
    #[inline]
    pub fn Taj(&self) -> u8 {
        self.TdjTaj & 0xf
    }
}

impl fmt::Debug for ScanComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanComponent")
            .field("Csj", &self.Csj)
            .field("Tdj", &self.Tdj())
            .field("Taj", &self.Taj())
            .finish()
    }
}
