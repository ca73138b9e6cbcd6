//! ビットベクトル式可変長配列のイメージビルダー
//!
//! このモジュールは、可変長バイト列の順序保存配列をランク・セレクトで
//! アドレス可能なイメージへパックするビルダーを提供します。
//!
//! イメージのレイアウト（整数はすべてリトルエンディアン）:
//!
//! ```text
//! num_elements: u32 | data_len: u32
//! | 開始ビットベクトル（データ1バイトにつき1ビット、要素の先頭で1、LSBから詰める）
//! | 連結データ
//! ```
//!
//! i番目の要素はselect1(i)で先頭オフセットが、次の1ビット（または末尾）で
//! 終端が定まります。

use crate::errors::{Result, YomidicError};
use crate::storage::bit_vector::BitVectorBuilder;

/// ビットベクトル式可変長配列のイメージビルダー
///
/// 要素は追加された順序を保ちます。
#[derive(Default)]
pub struct BitVectorBasedArrayBuilder {
    elements: Vec<Vec<u8>>,
    built: bool,
    image: Vec<u8>,
}

impl BitVectorBasedArrayBuilder {
    /// 新しいビルダーを作成します。
    pub fn new() -> Self {
        Self::default()
    }

    /// 要素を配列の末尾に追加します。
    ///
    /// # 引数
    ///
    /// * `element` - 追加するバイト列（非空）
    ///
    /// # エラー
    ///
    /// 空のバイト列を渡した場合、または`build()`の後に呼んだ場合に
    /// エラーを返します。
    pub fn add(&mut self, element: Vec<u8>) -> Result<()> {
        if self.built {
            return Err(YomidicError::invalid_state(
                "BitVectorBasedArrayBuilder::add",
                "add() must not be called after build()",
            ));
        }
        if element.is_empty() {
            // A zero-length element would collapse onto the next start bit.
            return Err(YomidicError::invalid_argument(
                "element",
                "empty element cannot be stored in the packed array",
            ));
        }
        self.elements.push(element);
        Ok(())
    }

    /// 追加済みの要素からイメージを構築します。
    ///
    /// # エラー
    ///
    /// 2回以上呼んだ場合にエラーを返します。
    pub fn build(&mut self) -> Result<()> {
        if self.built {
            return Err(YomidicError::invalid_state(
                "BitVectorBasedArrayBuilder::build",
                "build() must not be called twice",
            ));
        }
        let data_len: usize = self.elements.iter().map(Vec::len).sum();

        let mut starts = BitVectorBuilder::new();
        for element in &self.elements {
            starts.push(true);
            for _ in 1..element.len() {
                starts.push(false);
            }
        }

        self.image.clear();
        self.image
            .extend(u32::try_from(self.elements.len())?.to_le_bytes());
        self.image.extend(u32::try_from(data_len)?.to_le_bytes());
        self.image.extend(starts.into_bytes());
        for element in &self.elements {
            self.image.extend(element);
        }
        self.built = true;
        Ok(())
    }

    /// 構築済みのイメージを取得します。
    ///
    /// # エラー
    ///
    /// `build()`の前に呼んだ場合にエラーを返します。
    pub fn image(&self) -> Result<&[u8]> {
        if !self.built {
            return Err(YomidicError::invalid_state(
                "BitVectorBasedArrayBuilder::image",
                "image() must not be called before build()",
            ));
        }
        Ok(&self.image)
    }

    /// 追加された要素の数を取得します。
    #[inline(always)]
    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }
}
