//! Download-then-republish of a single video.

use crate::VideoId;
use crate::fetch::MediaFetcher;
use crate::poll::CycleError;
use crate::publish::Publisher;

/// Moves one video from the source channel to the destination account.
#[derive(Debug)]
pub struct Pipeline<M, P> {
    fetcher: M,
    publisher: P,
}

impl<M, P> Pipeline<M, P>
where
    M: MediaFetcher,
    P: Publisher,
{
    pub fn new(fetcher: M, publisher: P) -> Self {
        Self { fetcher, publisher }
    }

    /// Downloads `video_id`, re-uploads it, and removes the local copy.
    ///
    /// Returns the id of the re-uploaded video. If the upload fails the downloaded file is left
    /// where it is. Failing to remove the file after a successful upload is only logged, since
    /// the video has been published at that point.
    #[tracing::instrument(skip(self))]
    pub async fn process(&self, video_id: &VideoId) -> Result<VideoId, CycleError> {
        let file = self
            .fetcher
            .download(video_id)
            .await
            .map_err(|cause| CycleError::Download {
                video_id: video_id.clone(),
                cause,
            })?;

        let remote_id = match self.publisher.republish(&file).await {
            Ok(id) => id,
            Err(cause) => {
                tracing::warn!(
                    path = %file.path.display(),
                    "upload failed; keeping downloaded file"
                );
                return Err(CycleError::Upload { file, cause });
            }
        };

        if let Err(e) = tokio::fs::remove_file(&file.path).await {
            tracing::warn!(
                path = %file.path.display(),
                error = %e,
                "failed to remove uploaded file"
            );
        }

        Ok(remote_id)
    }
}
