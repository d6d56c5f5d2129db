//! Behaviour every `AssetStore` must show, whatever the backend.

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::sync::CancellationToken;

use crate::{
    adapters::AssetStore,
    model::{
        asset::{AssetKey, AssetRef},
        error::{AssetResult, ErrorKind},
    },
};

fn kind_of(res: AssetResult<()>) -> Option<ErrorKind> {
    res.err().map(|err| err.kind())
}

async fn read(store: &dyn AssetStore, source: &AssetRef) -> AssetResult<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    store.download(source, &mut buf, &CancellationToken::new()).await?;
    Ok(buf)
}

/// Initializes `store` and runs every single-caller property against it.
pub async fn verify_store_contract(store: &dyn AssetStore) {
    let ct = CancellationToken::new();
    store.initialize(&ct).await.unwrap();

    // concrete scenario
    let key = AssetRef::from(AssetKey::new("a1", 1, Some("")).unwrap());
    store.upload(&key, &mut &b"hello"[..], false, &ct).await.unwrap();
    assert_eq!(
        kind_of(store.upload(&key, &mut &b"other"[..], false, &ct).await),
        Some(ErrorKind::AlreadyExists)
    );
    assert_eq!(read(store, &key).await.unwrap(), b"hello");
    store.delete(&key, &ct).await.unwrap();
    assert_eq!(kind_of(read(store, &key).await.map(|_| ())), Some(ErrorKind::NotFound));

    // overwrite always wins, whether or not something is stored
    let key = AssetRef::from(AssetKey::new("a2", 3, Some("thumb")).unwrap());
    for payload in [&b"first"[..], &b"second"[..], &b""[..]] {
        store.upload(&key, &mut &payload[..], true, &ct).await.unwrap();
        assert_eq!(read(store, &key).await.unwrap(), payload);
    }

    // delete is idempotent
    store.delete(&key, &ct).await.unwrap();
    store.delete(&key, &ct).await.unwrap();
    assert_eq!(kind_of(read(store, &key).await.map(|_| ())), Some(ErrorKind::NotFound));

    // binary round trip
    let payload: Vec<u8> = (0..=255u8).cycle().take(64 * 1024 + 7).collect();
    let key = AssetRef::from(AssetKey::new("a_3", 0, None).unwrap());
    store.upload(&key, &mut payload.as_slice(), false, &ct).await.unwrap();
    assert_eq!(read(store, &key).await.unwrap(), payload);

    // versions and variants are distinct objects
    let v1 = AssetRef::from(AssetKey::new("a4", 1, None).unwrap());
    let v2 = AssetRef::from(AssetKey::new("a4", 2, None).unwrap());
    let v1_small = AssetRef::from(AssetKey::new("a4", 1, Some("small")).unwrap());
    store.upload(&v1, &mut &b"v1"[..], false, &ct).await.unwrap();
    store.upload(&v2, &mut &b"v2"[..], false, &ct).await.unwrap();
    store.upload(&v1_small, &mut &b"v1-small"[..], false, &ct).await.unwrap();
    assert_eq!(read(store, &v1).await.unwrap(), b"v1");
    assert_eq!(read(store, &v2).await.unwrap(), b"v2");
    assert_eq!(read(store, &v1_small).await.unwrap(), b"v1-small");

    // staged upload promoted by copy
    let staged = AssetRef::file("upload-7f3c").unwrap();
    store.upload(&staged, &mut &b"staged"[..], false, &ct).await.unwrap();
    assert_eq!(
        kind_of(store.upload(&staged, &mut &b"again"[..], false, &ct).await),
        Some(ErrorKind::AlreadyExists)
    );

    let destination = AssetKey::new("a5", 1, None).unwrap();
    store.copy("upload-7f3c", &destination, &ct).await.unwrap();
    assert_eq!(
        read(store, &AssetRef::from(destination.clone())).await.unwrap(),
        read(store, &staged).await.unwrap()
    );

    assert_eq!(
        kind_of(store.copy("missing-upload", &AssetKey::new("a5", 2, None).unwrap(), &ct).await),
        Some(ErrorKind::NotFound)
    );

    let occupied = AssetKey::new("a5", 3, None).unwrap();
    store
        .upload(&AssetRef::from(occupied.clone()), &mut &b"occupied"[..], false, &ct)
        .await
        .unwrap();
    assert_eq!(
        kind_of(store.copy("upload-7f3c", &occupied, &ct).await),
        Some(ErrorKind::AlreadyExists)
    );
    assert_eq!(read(store, &AssetRef::from(occupied)).await.unwrap(), b"occupied");

    store.delete(&staged, &ct).await.unwrap();
    assert_eq!(kind_of(read(store, &staged).await.map(|_| ())), Some(ErrorKind::NotFound));

    // an absent public url is a normal answer
    assert!(store.public_url(&destination).is_ok());

    // initialize twice is harmless and keeps the data
    store.initialize(&ct).await.unwrap();
    assert_eq!(read(store, &v2).await.unwrap(), b"v2");
}

/// Every operation on a store that was never initialized is a configuration failure.
pub async fn verify_uninitialized(store: &dyn AssetStore) {
    let ct = CancellationToken::new();
    let key = AssetKey::new("a1", 1, None).unwrap();
    let target = AssetRef::from(key.clone());

    let results = vec![
        ("upload", kind_of(store.upload(&target, &mut &b"hello"[..], false, &ct).await)),
        ("download", kind_of(store.download(&target, &mut Vec::<u8>::new(), &ct).await)),
        ("copy", kind_of(store.copy("staged", &key, &ct).await)),
        ("delete", kind_of(store.delete(&target, &ct).await)),
        ("public_url", kind_of(store.public_url(&key).map(|_| ()))),
    ];

    for (operation, kind) in results {
        assert_eq!(
            kind,
            Some(ErrorKind::ConfigurationFailure),
            "failed for case: {}",
            operation
        );
    }
}

/// Racing non-overwriting uploads of one key: exactly one wins and its bytes stay.
pub async fn verify_concurrent_uploads(store: &dyn AssetStore) {
    let ct = CancellationToken::new();
    let target = AssetRef::from(AssetKey::new("contended", 1, None).unwrap());

    let payloads: Vec<Vec<u8>> = (0..16).map(|i| format!("writer-{}", i).into_bytes()).collect();
    let mut readers: Vec<&[u8]> = payloads.iter().map(|p| p.as_slice()).collect();

    let results = futures::future::join_all(
        readers
            .iter_mut()
            .map(|reader| store.upload(&target, reader, false, &ct)),
    )
    .await;

    let mut winners = Vec::new();
    for (i, res) in results.into_iter().enumerate() {
        match res {
            Ok(_) => winners.push(i),
            Err(err) => assert_eq!(err.kind(), ErrorKind::AlreadyExists, "failed for writer: {}", i),
        }
    }

    assert_eq!(winners.len(), 1, "expected exactly one winner, got {:?}", winners);
    assert_eq!(read(store, &target).await.unwrap(), payloads[winners[0]]);
}

/// Hands out some bytes, then never finishes, like a client that stopped sending.
#[derive(Default)]
struct StalledReader {
    sent: bool,
}

impl AsyncRead for StalledReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.sent {
            return Poll::Pending;
        }

        self.sent = true;
        buf.put_slice(b"partial");
        Poll::Ready(Ok(()))
    }
}

/// A cancelled upload reports `Cancelled` and leaves nothing behind, whether
/// the token fired before the call or while data was still arriving.
pub async fn verify_cancelled(store: &dyn AssetStore) {
    let cancelled = CancellationToken::new();
    cancelled.cancel();

    let target = AssetRef::from(AssetKey::new("cancelled", 1, None).unwrap());
    assert_eq!(
        kind_of(store.upload(&target, &mut &b"never"[..], false, &cancelled).await),
        Some(ErrorKind::Cancelled)
    );
    assert_eq!(kind_of(read(store, &target).await.map(|_| ())), Some(ErrorKind::NotFound));

    let ct = CancellationToken::new();
    let canceller = ct.clone();
    let target = AssetRef::from(AssetKey::new("stalled", 1, None).unwrap());
    let mut reader = StalledReader::default();

    let (res, _) = tokio::join!(store.upload(&target, &mut reader, true, &ct), async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    assert!(reader.sent, "upload never started reading");
    assert_eq!(kind_of(res), Some(ErrorKind::Cancelled));
    assert_eq!(kind_of(read(store, &target).await.map(|_| ())), Some(ErrorKind::NotFound));
}
