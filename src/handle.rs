use super::{
    errors::PoolError,
    result::SpawnResult,
};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll}
};
use tokio::sync::oneshot;


/// Handle на результат задачи, отправленной без ожидания
pub struct JoinHandle<T> {
    receiver: oneshot::Receiver<SpawnResult<T>>,
}

impl<T> JoinHandle<T> {

    pub fn new(receiver: oneshot::Receiver<SpawnResult<T>>) -> Self {
        Self { receiver }
    }

}

impl<T> Future for JoinHandle<T> {
    type Output = SpawnResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(res) => Poll::Ready(res.unwrap_or(Err(PoolError::ChannelClosed))),
            Poll::Pending => Poll::Pending,
        }
    }
}
