use snafu::prelude::*;
use url::Url;

use crate::{release::newest_stable_after, ErrorKind, Release, Version};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to request release index {url}"))]
    ReqwestGet { url: Url, source: reqwest::Error },
    #[snafu(display("release index {url} answered with an error status"))]
    ReqwestGetErrorForStatus { url: Url, source: reqwest::Error },
    #[snafu(display("failed to read release index {url}"))]
    ReqwestBytes { url: Url, source: reqwest::Error },
    #[cfg(feature = "asm")]
    #[snafu(display("malformed release index {url}"))]
    SimdJsonSerdeFromSlice { url: Url, source: simd_json::Error },
    #[cfg(not(feature = "asm"))]
    #[snafu(display("malformed release index {url}"))]
    SerdeJsonFromSlice { url: Url, source: serde_json::Error },
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ReqwestGet { .. } | Error::ReqwestGetErrorForStatus { .. } | Error::ReqwestBytes { .. } => {
                ErrorKind::Network
            },
            #[cfg(feature = "asm")]
            Error::SimdJsonSerdeFromSlice { .. } => ErrorKind::Parse,
            #[cfg(not(feature = "asm"))]
            Error::SerdeJsonFromSlice { .. } => ErrorKind::Parse,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IndexMode {
    /// Only the currently supported releases.
    Latest,
    /// Every release ever published, unstable ones included.
    All,
}

#[derive(Clone, Debug)]
pub struct IndexClient {
    client: reqwest::Client,
    url: Url,
}

impl IndexClient {
    #[must_use]
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }

    #[must_use]
    pub fn url(&self, mode: IndexMode) -> Url {
        let mut url = self.url.clone();
        url.set_query(None);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("mode", "json");
            if mode == IndexMode::All {
                query.append_pair("include", "all");
            }
        }
        url
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub async fn fetch(&self, mode: IndexMode) -> Result<Vec<Release>, self::Error> {
        let url = self.url(mode);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .context(ReqwestGetSnafu { url: url.clone() })?
            .error_for_status()
            .context(ReqwestGetErrorForStatusSnafu { url: url.clone() })?;
        let bytes = response.bytes().await.context(ReqwestBytesSnafu { url: url.clone() })?;

        #[cfg(feature = "asm")]
        let releases = {
            let mut bytes = bytes.to_vec();
            simd_json::serde::from_slice::<Vec<Release>>(&mut bytes).context(SimdJsonSerdeFromSliceSnafu { url })?
        };
        #[cfg(not(feature = "asm"))]
        let releases = serde_json::from_slice::<Vec<Release>>(&bytes).context(SerdeJsonFromSliceSnafu { url })?;

        #[cfg(feature = "tracing")]
        tracing::debug!(count = releases.len(), "fetched release index");

        Ok(releases)
    }

    pub async fn fetch_all(&self) -> Result<Vec<Release>, self::Error> {
        self.fetch(IndexMode::All).await
    }

    /// The greatest stable release newer than `current`, or any newest stable
    /// release when nothing is installed.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub async fn find_newer_stable(&self, current: Option<&Version>) -> Result<Option<Release>, self::Error> {
        let releases = self.fetch(IndexMode::Latest).await?;
        Ok(newest_stable_after(&releases, current).cloned())
    }
}
