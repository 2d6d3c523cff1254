//! Streaming ZIP encoder for non-seekable outputs.
//!
//! Entries are written strictly front to back. File entries set the
//! data-descriptor flag, so their CRC and sizes follow the compressed data
//! instead of being patched into the local header. The central directory is
//! emitted by [`ZipStreamWriter::finish`], with ZIP64 records whenever a size,
//! offset or the entry count does not fit the classic fields.

use std::io::{self, Read, Write};
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, Timelike};
use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};

const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;
const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
const ZIP64_END_SIGNATURE: u32 = 0x0606_4b50;
const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;
const END_OF_CENTRAL_DIR_SIGNATURE: u32 = 0x0605_4b50;

const VERSION_DEFAULT: u16 = 20;
const VERSION_ZIP64: u16 = 45;
/// Upper byte 3 marks Unix external attributes.
const VERSION_MADE_BY: u16 = (3 << 8) | VERSION_ZIP64;

const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
const FLAG_UTF8: u16 = 0x0800;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

const ZIP64_EXTRA_ID: u16 = 0x0001;
const MSDOS_DIRECTORY: u32 = 0x10;

const U32_MAX: u64 = u32::MAX as u64;
const U16_MAX: u64 = u16::MAX as u64;

const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Central directory record kept for every entry written so far.
#[derive(Debug)]
struct CentralEntry {
    name: String,
    flags: u16,
    method: u16,
    dos_time: u16,
    dos_date: u16,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    offset: u64,
    external_attributes: u32,
}

impl CentralEntry {
    fn needs_zip64(&self) -> bool {
        self.compressed_size >= U32_MAX
            || self.uncompressed_size >= U32_MAX
            || self.offset >= U32_MAX
    }
}

/// Counts bytes on their way to the underlying writer.
#[derive(Debug)]
struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Writes a ZIP archive entry by entry to any [`Write`].
#[derive(Debug)]
pub struct ZipStreamWriter<W: Write> {
    out: CountingWriter<W>,
    entries: Vec<CentralEntry>,
}

impl<W: Write> ZipStreamWriter<W> {
    /// Start an archive on `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            out: CountingWriter { inner, written: 0 },
            entries: Vec::new(),
        }
    }

    /// Bytes emitted so far.
    pub fn bytes_written(&self) -> u64 {
        self.out.written
    }

    /// Add a directory entry. A trailing `/` is appended to `name` if missing.
    pub fn add_directory(&mut self, name: &str, modified: SystemTime, mode: u32) -> io::Result<()> {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{name}/")
        };
        let (dos_time, dos_date) = dos_datetime(modified);

        let entry = CentralEntry {
            name,
            flags: FLAG_UTF8,
            method: METHOD_STORED,
            dos_time,
            dos_date,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            offset: self.out.written,
            external_attributes: (mode << 16) | MSDOS_DIRECTORY,
        };
        self.write_local_header(&entry)?;
        self.entries.push(entry);
        Ok(())
    }

    /// Add a deflated file entry whose content is read from `content` until
    /// end of stream. Returns the number of uncompressed bytes.
    pub fn add_file<R: Read + ?Sized>(
        &mut self,
        name: &str,
        modified: SystemTime,
        mode: u32,
        content: &mut R,
    ) -> io::Result<u64> {
        let (dos_time, dos_date) = dos_datetime(modified);
        let mut entry = CentralEntry {
            name: name.to_string(),
            flags: FLAG_UTF8 | FLAG_DATA_DESCRIPTOR,
            method: METHOD_DEFLATED,
            dos_time,
            dos_date,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            offset: self.out.written,
            external_attributes: mode << 16,
        };
        self.write_local_header(&entry)?;

        let data_start = self.out.written;
        let mut crc = Crc::new();
        let mut total = 0u64;
        {
            let mut encoder = DeflateEncoder::new(&mut self.out, Compression::default());
            let mut buf = vec![0u8; COPY_BUFFER_SIZE];
            loop {
                let n = match content.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                };
                crc.update(&buf[..n]);
                total += n as u64;
                encoder.write_all(&buf[..n])?;
            }
            encoder.finish()?;
        }

        entry.crc32 = crc.sum();
        entry.uncompressed_size = total;
        entry.compressed_size = self.out.written - data_start;
        self.write_data_descriptor(&entry)?;
        self.entries.push(entry);
        Ok(total)
    }

    /// Write the central directory and end records, returning the output.
    pub fn finish(mut self) -> io::Result<W> {
        let directory_start = self.out.written;
        for entry in &self.entries {
            write_central_header(&mut self.out, entry)?;
        }
        let directory_size = self.out.written - directory_start;
        let count = self.entries.len() as u64;

        let needs_zip64 = count >= U16_MAX
            || directory_size >= U32_MAX
            || directory_start >= U32_MAX
            || self.entries.iter().any(CentralEntry::needs_zip64);

        if needs_zip64 {
            let zip64_end_offset = self.out.written;
            let out = &mut self.out;
            put_u32(out, ZIP64_END_SIGNATURE)?;
            put_u64(out, 44)?; // size of the remaining record
            put_u16(out, VERSION_MADE_BY)?;
            put_u16(out, VERSION_ZIP64)?;
            put_u32(out, 0)?; // this disk
            put_u32(out, 0)?; // disk with central directory
            put_u64(out, count)?;
            put_u64(out, count)?;
            put_u64(out, directory_size)?;
            put_u64(out, directory_start)?;

            put_u32(out, ZIP64_LOCATOR_SIGNATURE)?;
            put_u32(out, 0)?;
            put_u64(out, zip64_end_offset)?;
            put_u32(out, 1)?; // total disks
        }

        let out = &mut self.out;
        put_u32(out, END_OF_CENTRAL_DIR_SIGNATURE)?;
        put_u16(out, 0)?;
        put_u16(out, 0)?;
        put_u16(out, count.min(U16_MAX) as u16)?;
        put_u16(out, count.min(U16_MAX) as u16)?;
        put_u32(out, directory_size.min(U32_MAX) as u32)?;
        put_u32(out, directory_start.min(U32_MAX) as u32)?;
        put_u16(out, 0)?; // comment length

        self.out.flush()?;
        Ok(self.out.inner)
    }

    fn write_local_header(&mut self, entry: &CentralEntry) -> io::Result<()> {
        let out = &mut self.out;
        put_u32(out, LOCAL_HEADER_SIGNATURE)?;
        put_u16(out, VERSION_DEFAULT)?;
        put_u16(out, entry.flags)?;
        put_u16(out, entry.method)?;
        put_u16(out, entry.dos_time)?;
        put_u16(out, entry.dos_date)?;
        // CRC and sizes are zero here: either the entry is empty, or the
        // data descriptor carries them.
        put_u32(out, 0)?;
        put_u32(out, 0)?;
        put_u32(out, 0)?;
        put_u16(out, name_len(&entry.name)?)?;
        put_u16(out, 0)?;
        out.write_all(entry.name.as_bytes())
    }

    fn write_data_descriptor(&mut self, entry: &CentralEntry) -> io::Result<()> {
        let out = &mut self.out;
        put_u32(out, DATA_DESCRIPTOR_SIGNATURE)?;
        put_u32(out, entry.crc32)?;
        if entry.compressed_size >= U32_MAX || entry.uncompressed_size >= U32_MAX {
            put_u64(out, entry.compressed_size)?;
            put_u64(out, entry.uncompressed_size)
        } else {
            put_u32(out, entry.compressed_size as u32)?;
            put_u32(out, entry.uncompressed_size as u32)
        }
    }
}

fn write_central_header<W: Write>(out: &mut W, entry: &CentralEntry) -> io::Result<()> {
    let mut extra = Vec::new();
    if entry.needs_zip64() {
        // Only the fields that overflow are present, in this fixed order.
        for value in [entry.uncompressed_size, entry.compressed_size, entry.offset] {
            if value >= U32_MAX {
                extra.extend_from_slice(&value.to_le_bytes());
            }
        }
        let mut header = Vec::with_capacity(4);
        header.extend_from_slice(&ZIP64_EXTRA_ID.to_le_bytes());
        header.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        extra.splice(0..0, header);
    }
    let version_needed = if entry.needs_zip64() {
        VERSION_ZIP64
    } else {
        VERSION_DEFAULT
    };

    put_u32(out, CENTRAL_HEADER_SIGNATURE)?;
    put_u16(out, VERSION_MADE_BY)?;
    put_u16(out, version_needed)?;
    put_u16(out, entry.flags)?;
    put_u16(out, entry.method)?;
    put_u16(out, entry.dos_time)?;
    put_u16(out, entry.dos_date)?;
    put_u32(out, entry.crc32)?;
    put_u32(out, entry.compressed_size.min(U32_MAX) as u32)?;
    put_u32(out, entry.uncompressed_size.min(U32_MAX) as u32)?;
    put_u16(out, name_len(&entry.name)?)?;
    put_u16(out, extra.len() as u16)?;
    put_u16(out, 0)?; // comment length
    put_u16(out, 0)?; // disk number start
    put_u16(out, 0)?; // internal attributes
    put_u32(out, entry.external_attributes)?;
    put_u32(out, entry.offset.min(U32_MAX) as u32)?;
    out.write_all(entry.name.as_bytes())?;
    out.write_all(&extra)
}

fn name_len(name: &str) -> io::Result<u16> {
    u16::try_from(name.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("entry name too long for a ZIP archive: {name}"),
        )
    })
}

/// MS-DOS time and date fields for `time` in local time.
///
/// DOS dates start in 1980; anything earlier is clamped to 1980-01-01.
pub fn dos_datetime(time: SystemTime) -> (u16, u16) {
    let local: DateTime<Local> = time.into();
    if local.year() < 1980 {
        return (0, (1 << 5) | 1);
    }
    if local.year() > 2107 {
        return ((23 << 11) | (59 << 5) | 29, (127 << 9) | (12 << 5) | 31);
    }

    let dos_time = (local.hour() << 11) | (local.minute() << 5) | (local.second() / 2);
    let dos_date = (((local.year() - 1980) as u32) << 9) | (local.month() << 5) | local.day();
    (dos_time as u16, dos_date as u16)
}

fn put_u16<W: Write + ?Sized>(out: &mut W, value: u16) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

fn put_u32<W: Write + ?Sized>(out: &mut W, value: u32) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

fn put_u64<W: Write + ?Sized>(out: &mut W, value: u64) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}
