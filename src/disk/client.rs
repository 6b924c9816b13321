use std::{
    sync::{
        mpsc::{self, RecvTimeoutError, Sender},
        Arc,
    },
    thread,
    time::Duration,
};

use log::{debug, error, warn};

use crate::disk::{
    block_device::BlockDevice,
    error::{BlockError, Result},
    types::{Block, BlockNumber},
};

type Job = Box<dyn FnOnce(&dyn BlockDevice) + Send>;

/// 块服务客户端
///
/// 所有调用排队交给同一个工作线程转发给服务端，调用方在回复通道上带超时等待。
/// 服务端挂起时调用方得到 `Timeout`，而不是永远阻塞。
///
/// 超时的请求仍留在队列里，稍后照样执行；但它一定在本客户端之后的请求之前完成，
/// 不会覆盖本客户端后来的写入。
pub struct BlockClient {
    jobs: Sender<Job>,
    timeout: Duration,
    block_size: usize,
    total_blocks: u32,
}

impl BlockClient {
    pub fn connect(server: Arc<dyn BlockDevice>, timeout: Duration) -> Self {
        let block_size = server.block_size();
        let total_blocks = server.total_blocks();
        let (jobs, queue) = mpsc::channel::<Job>();

        let worker = thread::Builder::new()
            .name("block-client".to_string())
            .spawn(move || {
                for job in queue {
                    job(server.as_ref());
                }
                debug!("block client worker stopped");
            });
        // 线程起不来时队列随之关闭，之后的调用都报 `Unavailable`
        if let Err(e) = worker {
            error!("cannot start block client worker: {}", e);
        }

        debug!(
            "block client connected: {} blocks of {} bytes, timeout {:?}",
            total_blocks, block_size, timeout
        );
        Self {
            jobs,
            timeout,
            block_size,
            total_blocks,
        }
    }

    fn call<T, F>(&self, request: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn BlockDevice) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let job: Job = Box::new(move |server: &dyn BlockDevice| {
            // 调用方超时后接收端已经关闭，发送失败可以忽略
            let _ = tx.send(request(server));
        });
        if self.jobs.send(job).is_err() {
            return Err(BlockError::Unavailable);
        }

        match rx.recv_timeout(self.timeout) {
            Ok(reply) => reply,
            Err(RecvTimeoutError::Timeout) => {
                warn!("block service call timed out after {:?}", self.timeout);
                Err(BlockError::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(BlockError::Unavailable),
        }
    }
}

impl BlockDevice for BlockClient {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    fn get(&self, block_number: BlockNumber) -> Result<Block> {
        self.call(move |server| server.get(block_number))
    }

    fn put(&self, block_number: BlockNumber, data: &[u8]) -> Result<()> {
        let data = data.to_vec();
        self.call(move |server| server.put(block_number, &data))
    }

    fn read_set(&self, block_number: BlockNumber, data: &[u8]) -> Result<Block> {
        let data = data.to_vec();
        self.call(move |server| server.read_set(block_number, &data))
    }
}
