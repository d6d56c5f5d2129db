use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::{
    adapters::{self, gcs::GcsClient, s3::S3Client},
    model::error::ProviderFailure,
};

/// Downloads are written out in chunks of this size.
pub const CHUNK_SIZE: usize = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MockOp {
    GetBucket,
    Upload,
    Download,
    Copy,
    Delete,
}

#[derive(Default)]
struct MockState {
    objects: HashMap<String, Vec<u8>>,
    faults: HashMap<MockOp, ProviderFailure>,
    calls: HashMap<MockOp, usize>,
    broken_downloads: bool,
}

/// In-memory object store speaking both the Cloud Storage and the S3 client
/// traits. Preconditions are evaluated under one lock, like the real services
/// do server-side. Injected faults stick until the mock is dropped.
#[derive(Clone, Default)]
pub struct MockObjectClient {
    state: Arc<Mutex<MockState>>,
}

impl MockObjectClient {
    pub fn inject(&self, op: MockOp, failure: ProviderFailure) {
        self.state.lock().unwrap().faults.insert(op, failure);
    }

    /// Downloads deliver their first chunk and then fail.
    pub fn break_downloads(&self) {
        self.state.lock().unwrap().broken_downloads = true;
    }

    pub fn calls(&self, op: MockOp) -> usize {
        self.state.lock().unwrap().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn object(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(name).cloned()
    }

    fn enter(&self, op: MockOp) -> Result<std::sync::MutexGuard<'_, MockState>, ProviderFailure> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(op).or_insert(0) += 1;

        if let Some(failure) = state.faults.get(&op) {
            return Err(failure.clone());
        }

        Ok(state)
    }

    fn put(&self, object: &str, data: Vec<u8>, only_if_absent: bool) -> Result<(), ProviderFailure> {
        let mut state = self.enter(MockOp::Upload)?;

        if only_if_absent && state.objects.contains_key(object) {
            return Err(ProviderFailure::status(412, "precondition failed"));
        }

        state.objects.insert(object.to_string(), data);
        Ok(())
    }

    async fn get(
        &self,
        object: &str,
        destination: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), ProviderFailure> {
        let (data, broken) = {
            let state = self.enter(MockOp::Download)?;
            let data = state
                .objects
                .get(object)
                .cloned()
                .ok_or_else(|| ProviderFailure::status(404, "no such object"))?;

            (data, state.broken_downloads)
        };

        for chunk in data.chunks(CHUNK_SIZE) {
            adapters::write_chunk(destination, chunk).await?;
            if broken {
                return Err(ProviderFailure::transport("connection reset"));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl GcsClient for MockObjectClient {
    async fn get_bucket(&self, _bucket: &str) -> Result<(), ProviderFailure> {
        self.enter(MockOp::GetBucket)?;
        Ok(())
    }

    async fn upload_object(
        &self,
        _bucket: &str,
        object: &str,
        data: Vec<u8>,
        if_generation_match: Option<i64>,
    ) -> Result<(), ProviderFailure> {
        tokio::task::yield_now().await;
        self.put(object, data, if_generation_match == Some(0))
    }

    async fn download_object(
        &self,
        _bucket: &str,
        object: &str,
        destination: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), ProviderFailure> {
        self.get(object, destination).await
    }

    async fn copy_object(
        &self,
        _bucket: &str,
        source: &str,
        destination: &str,
        if_generation_match: Option<i64>,
    ) -> Result<(), ProviderFailure> {
        let mut state = self.enter(MockOp::Copy)?;

        let data = match state.objects.get(source) {
            None => return Err(ProviderFailure::status(404, "no such object")),
            Some(data) => data.clone(),
        };

        if if_generation_match == Some(0) && state.objects.contains_key(destination) {
            return Err(ProviderFailure::status(412, "precondition failed"));
        }

        state.objects.insert(destination.to_string(), data);
        Ok(())
    }

    async fn delete_object(&self, _bucket: &str, object: &str) -> Result<(), ProviderFailure> {
        let mut state = self.enter(MockOp::Delete)?;

        match state.objects.remove(object) {
            None => Err(ProviderFailure::status(404, "no such object")),
            Some(_) => Ok(()),
        }
    }
}

#[async_trait]
impl S3Client for MockObjectClient {
    async fn head_bucket(&self, _bucket: &str) -> Result<(), ProviderFailure> {
        self.enter(MockOp::GetBucket)?;
        Ok(())
    }

    async fn put_object(
        &self,
        _bucket: &str,
        key: &str,
        data: Vec<u8>,
        if_none_match: bool,
    ) -> Result<(), ProviderFailure> {
        tokio::task::yield_now().await;
        self.put(key, data, if_none_match)
    }

    async fn get_object(
        &self,
        _bucket: &str,
        key: &str,
        destination: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), ProviderFailure> {
        self.get(key, destination).await
    }

    async fn delete_object(&self, _bucket: &str, key: &str) -> Result<(), ProviderFailure> {
        // S3 answers 204 whether or not the key existed
        let mut state = self.enter(MockOp::Delete)?;
        state.objects.remove(key);

        Ok(())
    }
}
