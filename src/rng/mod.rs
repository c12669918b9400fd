/*
 * @Author       : 老董
 * @Date         : 2026-02-18
 * @Description  : 显式传递的确定性随机键序列
 *
 * RngSeq 不是全局状态：由调用者（通常是训练循环）创建并持有，
 * 作为参数显式传入 init。每次取键都推进内部计数器，
 * 相同种子 + 相同取键次序必然产生相同的键流。
 */

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};


/// 随机键派生用的乘数（splitmix系常数，保证相邻计数器的键充分散开）
const KEY_SPREAD: u64 = 0x9E37_79B9_7F4A_7C15;

/// 确定性随机键序列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RngSeq {
    seed: u64,
    counter: u64,
}

impl RngSeq {
    /// 以给定种子创建键序列
    pub const fn new(seed: u64) -> Self {
        Self { seed, counter: 0 }
    }

    /// 派生下一个u64键并推进计数器
    pub fn next_key(&mut self) -> u64 {
        let stream = self.seed ^ self.counter.wrapping_mul(KEY_SPREAD);
        self.counter += 1;
        StdRng::seed_from_u64(stream).r#gen()
    }

    /// 以下一个键为种子构造StdRng（参数初始化用）
    pub fn next_rng(&mut self) -> StdRng {
        StdRng::seed_from_u64(self.next_key())
    }

    /// 已取键的次数
    pub const fn draws(&self) -> u64 {
        self.counter
    }
}
