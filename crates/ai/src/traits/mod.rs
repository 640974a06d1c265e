mod image_caption;

use crate::HandlerPayload;
use anyhow::anyhow;
pub use image_caption::*;
use std::fmt::Debug;
use std::future::Future;
use tokio::sync::{mpsc, oneshot};

pub trait Model {
    type Item;
    type Output;

    fn process(
        &mut self,
        items: Vec<Self::Item>,
    ) -> impl Future<Output = anyhow::Result<Vec<anyhow::Result<Self::Output>>>> + Send;

    fn batch_size_limit(&self) -> usize;
}

pub type BatchHandlerTx<Item, Output> = mpsc::Sender<HandlerPayload<Item, Output>>;

/// Handle to a model living on its own worker thread.
///
/// The worker owns the model exclusively and drains a bounded channel, so
/// every call through any clone of the handle is served one at a time.
/// The worker stops once every handle has been dropped.
#[derive(Debug)]
pub struct AIModel<TItem, TOutput> {
    model_id: String, // for better logging
    tx: BatchHandlerTx<TItem, TOutput>,
}

impl<TItem, TOutput> Clone for AIModel<TItem, TOutput> {
    fn clone(&self) -> Self {
        Self {
            model_id: self.model_id.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<TItem, TOutput> AIModel<TItem, TOutput>
where
    TItem: Send + Sync + Clone + Debug + 'static,
    TOutput: Send + Sync + Debug + 'static,
{
    /// Spawn the worker and load the model on it.
    ///
    /// Resolves only after `create_model` has finished, so weights are in
    /// memory before the first request and load failures surface here.
    pub async fn new<T, TFut, TFn>(model_id: impl Into<String>, create_model: TFn) -> anyhow::Result<Self>
    where
        T: Model<Item = TItem, Output = TOutput> + Send + 'static,
        TFut: Future<Output = anyhow::Result<T>> + Send + 'static,
        TFn: FnOnce() -> TFut + Send + 'static,
    {
        let model_id = model_id.into();
        let (tx, mut rx) = mpsc::channel::<HandlerPayload<TItem, TOutput>>(512);
        let (ready_tx, ready_rx) = oneshot::channel::<anyhow::Result<()>>();

        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        let worker_model_id = model_id.clone();
        std::thread::Builder::new()
            .name(format!("model-{}", model_id))
            .spawn(move || {
                let local = tokio::task::LocalSet::new();

                local.spawn_local(async move {
                    tracing::debug!(model_id = %worker_model_id, "loading model");
                    let mut model = match create_model().await {
                        Ok(model) => {
                            let _ = ready_tx.send(Ok(()));
                            model
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    tracing::info!(model_id = %worker_model_id, "model loaded");

                    while let Some((items, result_tx)) = rx.recv().await {
                        // If channel closed,
                        // we have no way to response, just ignore task.
                        // This happens when the client went away mid request.
                        if result_tx.is_closed() {
                            tracing::debug!(model_id = %worker_model_id, "result receiver dropped, skip items");
                            continue;
                        }

                        let results = model.process(items).await;

                        if result_tx.send(results).is_err() {
                            tracing::error!(model_id = %worker_model_id, "failed to send results");
                        }
                    }

                    // this means all tx has been dropped
                    tracing::info!(model_id = %worker_model_id, "all handles dropped, model worker exits");
                });

                rt.block_on(local);
            })?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(Self { model_id, tx }),
            Ok(Err(e)) => Err(e.context(format!("failed to load model {}", model_id))),
            Err(_) => Err(anyhow!("model worker for {} exited before loading", model_id)),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    #[tracing::instrument(name = "AIModel::process", err(Debug), skip_all, fields(model_id=%self.model_id))]
    pub async fn process(&self, items: Vec<TItem>) -> anyhow::Result<Vec<anyhow::Result<TOutput>>> {
        let (result_tx, rx) = oneshot::channel();
        match self.tx.send((items, result_tx)).await {
            Ok(_) => {
                tracing::debug!("items sent to model");
            }
            Err(e) => {
                anyhow::bail!("failed to send items: {:?}", e);
            }
        }

        match rx.await {
            Ok(result) => result,
            Err(e) => {
                anyhow::bail!("failed to receive results: {:?}", e);
            }
        }
    }

    #[tracing::instrument(name = "AIModel::process_single", err(Debug), skip_all, fields(model_id=%self.model_id))]
    pub async fn process_single(&self, item: TItem) -> anyhow::Result<TOutput> {
        let results = self.process(vec![item]).await?;
        let result = results
            .into_iter()
            .next()
            .ok_or(anyhow!("no result"))??;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use std::time::Duration;

    struct Doubler {
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl Model for Doubler {
        type Item = u32;
        type Output = u32;

        fn batch_size_limit(&self) -> usize {
            4
        }

        async fn process(&mut self, items: Vec<u32>) -> anyhow::Result<Vec<anyhow::Result<u32>>> {
            if items.len() > self.batch_size_limit() {
                anyhow::bail!("too many items");
            }

            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            Ok(items
                .into_iter()
                .map(|v| {
                    if v == 13 {
                        Err(anyhow!("unlucky"))
                    } else {
                        Ok(v * 2)
                    }
                })
                .collect())
        }
    }

    async fn doubler() -> (AIModel<u32, u32>, Arc<AtomicUsize>) {
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let max_clone = max_in_flight.clone();
        let model = AIModel::new("doubler", move || async move {
            Ok(Doubler {
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_in_flight: max_clone,
            })
        })
        .await
        .expect("create doubler");
        (model, max_in_flight)
    }

    #[test_log::test(tokio::test)]
    async fn test_process_single() {
        let (model, _) = doubler().await;
        assert_eq!(model.model_id(), "doubler");
        assert_eq!(model.process_single(21).await.unwrap(), 42);
        assert!(model.process_single(13).await.is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_batch_results_keep_order() {
        let (model, _) = doubler().await;
        let results = model.process(vec![1, 13, 3]).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(*results[0].as_ref().unwrap(), 2);
        assert!(results[1].is_err());
        assert_eq!(*results[2].as_ref().unwrap(), 6);

        assert!(model.process(vec![1, 2, 3, 4, 5]).await.is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_concurrent_calls_are_serialized() {
        let (model, max_in_flight) = doubler().await;

        let handles = (0..8u32)
            .map(|i| {
                let model = model.clone();
                tokio::spawn(async move { model.process_single(i).await })
            })
            .collect::<Vec<_>>();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap().unwrap(), i as u32 * 2);
        }
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_load_failure_surfaces_from_new() {
        let result = AIModel::<u32, u32>::new("broken", || async {
            Err::<Doubler, _>(anyhow!("weights missing"))
        })
        .await;

        let err = result.expect_err("load should fail");
        assert!(format!("{:#}", err).contains("weights missing"));
    }
}
