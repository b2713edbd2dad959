//! Common, IO-related code.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Read, Write},
    path::Path,
};

use flate2::{bufread::MultiGzDecoder, write::GzEncoder, Compression};

use crate::err::AppError;

/// Whether the file at `path` starts with the gzip magic bytes.
pub fn is_gzip<P>(path: P) -> Result<bool, AppError>
where
    P: AsRef<Path>,
{
    let mut magic = [0u8; 2];
    let mut file = File::open(path.as_ref()).map_err(|e| AppError::io(path.as_ref(), e))?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == [0x1f, 0x8b]),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(AppError::io(path.as_ref(), e)),
    }
}

/// Transparently open a file with gzip decoder.
///
/// Compression is detected from the file contents, not only from the name.
pub fn open_read_maybe_gz<P>(path: P) -> Result<Box<dyn BufRead>, AppError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| AppError::io(path, e))?;
    if is_gzip(path)? {
        tracing::trace!("Opening {:?} as gzip for reading", path);
        let bufreader = BufReader::new(file);
        let decoder = MultiGzDecoder::new(bufreader);
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        tracing::trace!("Opening {:?} as plain text for reading", path);
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Transparently open a file with gzip encoder.
pub fn open_write_maybe_gz<P>(path: P) -> Result<Box<dyn Write>, AppError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| AppError::io(path, e))?;
    if path.extension().map(|s| s.to_str()) == Some(Some("gz")) {
        tracing::trace!("Opening {:?} as gzip for writing", path);
        let bufwriter = BufWriter::new(file);
        let encoder = GzEncoder::new(bufwriter, Compression::default());
        Ok(Box::new(encoder))
    } else {
        tracing::trace!("Opening {:?} as plain text for writing", path);
        Ok(Box::new(BufWriter::new(file)))
    }
}

#[cfg(test)]
mod test {
    use std::io::{Read, Write};

    #[rstest::rstest]
    #[case("test.txt")]
    #[case("test.txt.gz")]
    fn write_then_read_maybe_gz(#[case] filename: &str) -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join(filename);

        {
            let mut f = super::open_write_maybe_gz(&path)?;
            f.write_all(b"chr1\t100\n")?;
            f.flush()?;
        }

        assert_eq!(super::is_gzip(&path)?, filename.ends_with(".gz"));

        let mut buf = String::new();
        super::open_read_maybe_gz(&path)?.read_to_string(&mut buf)?;
        assert_eq!(buf, "chr1\t100\n");

        Ok(())
    }

    #[test]
    fn open_missing_file_names_path() {
        let res = super::open_read_maybe_gz("tests/data/does-not-exist.tsv");

        match res {
            Err(e) => assert!(e.to_string().contains("does-not-exist.tsv")),
            Ok(_) => panic!("expected an error"),
        }
    }
}
