use crate::config::{SourceConfig, SourceKind};
use crate::error::Error;
use crate::seed::Prng;
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

/// Supplier of payload bytes for generated frames.
#[async_trait]
pub trait PayloadSource: Send + Sync {
    /// Fill `buf` completely with the next payload bytes.
    async fn fill(&self, buf: &mut [u8]) -> Result<(), Error>;
}

/// Pseudo-random payloads from a seeded generator.
pub struct RandomSource {
    prng: Mutex<Prng>,
}

impl RandomSource {
    pub fn new(prng: Prng) -> Self {
        Self {
            prng: Mutex::new(prng),
        }
    }
}

#[async_trait]
impl PayloadSource for RandomSource {
    async fn fill(&self, buf: &mut [u8]) -> Result<(), Error> {
        let mut prng = self.prng.lock().await;
        prng.fill_bytes(buf);
        // Payload bytes stay in 1..=0xf0; zeroed scratch never looks like
        // traffic.
        for b in buf.iter_mut() {
            *b = *b % 0xf0 + 1;
        }
        Ok(())
    }
}

/// Payloads replayed from a file, rewinding to the start on EOF.
pub struct FileSource {
    file: Mutex<File>,
    offset: Mutex<u64>,
}

impl FileSource {
    pub async fn new(path: &str) -> io::Result<Self> {
        let file = File::open(path).await?;
        if file.metadata().await?.len() == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("source file is empty: {}", path),
            ));
        }
        Ok(Self {
            file: Mutex::new(file),
            offset: Mutex::new(0),
        })
    }
}

#[async_trait]
impl PayloadSource for FileSource {
    async fn fill(&self, buf: &mut [u8]) -> Result<(), Error> {
        let mut file = self.file.lock().await;
        let mut offset = self.offset.lock().await;

        // Seek to saved offset
        file.seek(tokio::io::SeekFrom::Start(*offset))
            .await
            .map_err(|e| Error::OsError(e.raw_os_error().unwrap_or(0) as u32))?;

        let mut bytes_read = 0usize;
        while bytes_read < buf.len() {
            match file.read(&mut buf[bytes_read..]).await {
                Ok(0) => {
                    // Reached EOF, reset to beginning
                    file.seek(tokio::io::SeekFrom::Start(0))
                        .await
                        .map_err(|e| Error::OsError(e.raw_os_error().unwrap_or(0) as u32))?;
                    *offset = 0;
                }
                Ok(n) => {
                    *offset += n as u64;
                    bytes_read += n;
                }
                Err(e) => return Err(Error::OsError(e.raw_os_error().unwrap_or(0) as u32)),
            }
        }
        Ok(())
    }
}

/// Build the payload source selected by the configuration.
pub async fn from_config(cfg: &SourceConfig) -> Result<Arc<dyn PayloadSource>, Error> {
    match cfg.kind {
        SourceKind::Random => {
            let prng = match cfg.seed {
                Some(seed) => Prng::from_seed(seed),
                None => Prng::seeded()?,
            };
            Ok(Arc::new(RandomSource::new(prng)))
        }
        SourceKind::File => {
            // Validation guarantees the path is present.
            let path = cfg.path.as_deref().ok_or(Error::InvalidArgument)?;
            let src = FileSource::new(path)
                .await
                .map_err(|e| Error::OsError(e.raw_os_error().unwrap_or(0) as u32))?;
            Ok(Arc::new(src))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn random_source_remaps_byte_domain() {
        let src = RandomSource::new(Prng::from_seed(1));
        let mut buf = [0u8; 256];
        src.fill(&mut buf).await.unwrap();
        assert!(buf.iter().all(|&b| (1..=0xf0).contains(&b)));
    }

    #[tokio::test]
    async fn file_source_replays_on_eof() {
        let path = std::env::temp_dir().join(format!("bytering-replay-{}.bin", std::process::id()));
        std::fs::write(&path, b"abc").unwrap();

        let src = FileSource::new(path.to_str().unwrap()).await.unwrap();
        let mut buf = [0u8; 8];
        src.fill(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abcabcab");
        // Offset carries over between calls.
        let mut next = [0u8; 2];
        src.fill(&mut next).await.unwrap();
        assert_eq!(&next, b"ca");

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn empty_file_is_rejected() {
        let path = std::env::temp_dir().join(format!("bytering-empty-{}.bin", std::process::id()));
        std::fs::write(&path, b"").unwrap();
        assert!(FileSource::new(path.to_str().unwrap()).await.is_err());
        std::fs::remove_file(&path).unwrap();
    }
}
