use std::sync::Arc;

use anyhow::{Context, anyhow};
use log::{info, warn};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use super::train::{TrainData, load_train_data};
use super::validate::validate_image;
use crate::cache::{Cache, CacheKey, CacheValue};
use crate::db::Database;
use crate::engine::{EngineError, FaceEngine};
use crate::errors::RecognizeError;

struct Job {
    data: Vec<u8>,
    reply: oneshot::Sender<Result<String, RecognizeError>>,
}

/// Serializes all use of the classification resource.
///
/// Exactly one owner thread holds the engine; the engine's reference
/// sample set is mutable state, so classifying concurrently with a sample
/// swap would race. Keeping the owner pool at one thread is what makes the
/// engine safe without its own lock.
///
/// The job queue is bounded: a full queue suspends `submit` callers
/// instead of growing without limit. There is no cancellation or timeout
/// anywhere in this pipeline; a hung engine call blocks all pending and
/// future submissions.
pub struct Coordinator {
    tx: mpsc::Sender<Job>,
}

impl Coordinator {
    /// Spawn the owner thread. `capacity` is the submission queue bound.
    pub fn start(
        engine: Box<dyn FaceEngine>,
        pool: Database,
        cache: Arc<Cache>,
        capacity: usize,
    ) -> anyhow::Result<Coordinator> {
        let handle = Handle::current();
        let (tx, rx) = mpsc::channel(capacity);
        std::thread::Builder::new()
            .name("facerec".to_owned())
            .spawn(move || owner_loop(engine, pool, cache, handle, rx))
            .context("error spawning recognition owner thread")?;
        Ok(Coordinator { tx })
    }

    /// Validate, enqueue and wait for this request's own result. Any
    /// number of callers may submit concurrently; each is resolved exactly
    /// once, in arrival order.
    pub async fn submit(&self, data: Vec<u8>) -> Result<String, RecognizeError> {
        validate_image(&data)?;

        let (reply, result) = oneshot::channel();
        self.tx
            .send(Job { data, reply })
            .await
            .map_err(|_| RecognizeError::Internal(anyhow!("recognition worker is gone")))?;
        result
            .await
            .map_err(|_| RecognizeError::Internal(anyhow!("recognition worker dropped the request")))?
    }
}

fn owner_loop(
    mut engine: Box<dyn FaceEngine>,
    pool: Database,
    cache: Arc<Cache>,
    handle: Handle,
    mut rx: mpsc::Receiver<Job>,
) {
    info!("recognition worker started");
    let mut loaded: Option<Arc<TrainData>> = None;
    while let Some(job) = rx.blocking_recv() {
        let result = recognize(engine.as_mut(), &pool, &cache, &handle, &mut loaded, &job.data);
        if job.reply.send(result).is_err() {
            warn!("recognition caller went away before its result was ready");
        }
    }
    info!("recognition worker stopped");
}

/// One request on the owner thread: refresh the training set if a new one
/// was built, extract a single face, classify it and map the category back
/// to an idol id.
fn recognize(
    engine: &mut dyn FaceEngine,
    pool: &Database,
    cache: &Cache,
    handle: &Handle,
    loaded: &mut Option<Arc<TrainData>>,
    data: &[u8],
) -> Result<String, RecognizeError> {
    let value = handle.block_on(cache.get_or_compute(CacheKey::TrainData, || async {
        let train = load_train_data(pool).await?;
        Ok(CacheValue::TrainData(Arc::new(train)))
    }))?;
    let train = value
        .into_train_data()
        .ok_or_else(|| anyhow!("train-data cache key holds a profiles value"))?;

    // The engine must always hold the most recently built training set
    // before any classify call.
    if !loaded.as_ref().is_some_and(|prev| Arc::ptr_eq(prev, &train)) {
        engine.set_reference_samples(&train.samples, &train.categories);
        *loaded = Some(train.clone());
    }

    let face = match engine.extract_single_face(data) {
        Ok(face) => face,
        Err(EngineError::ImageLoad(_)) => return Err(RecognizeError::BadImage),
        Err(EngineError::Inference(e)) => {
            return Err(RecognizeError::Internal(e.context("face extraction failed")));
        }
    };
    let Some(face) = face else {
        return Err(RecognizeError::NoSingleFace);
    };

    let category = engine.classify(&face.descriptor);
    if category < 0 {
        return Err(RecognizeError::NoIdol);
    }
    train.labels.get(&category).cloned().ok_or_else(|| {
        RecognizeError::Internal(anyhow!("classifier returned category {category} with no label"))
    })
}
