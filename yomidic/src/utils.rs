//! ユーティリティ関数と型変換トレイトを提供するモジュール
//!
//! このモジュールには、型変換トレイトと仮名変換のヘルパー関数が含まれています。

/// u32から他の型への変換を提供するトレイト
///
/// このトレイトは、u32値を実装型に変換する機能を定義します。
/// 標準ライブラリのFromトレイトとは異なり、特定の最適化や
/// プラットフォーム固有の仮定を行うことができます。
pub trait FromU32 {
    /// u32値から実装型を生成する
    ///
    /// # 引数
    ///
    /// * `src` - 変換元のu32値
    ///
    /// # 戻り値
    ///
    /// 変換された実装型の値
    fn from_u32(src: u32) -> Self;
}

#[cfg(any(target_pointer_width = "32", target_pointer_width = "64"))]
impl FromU32 for usize {
    /// u32値をusizeに変換する
    ///
    /// ポインタ幅が32ビットまたは64ビットであることが保証されているため、
    /// この変換は常に成功します。
    #[inline(always)]
    fn from_u32(src: u32) -> Self {
        // Since the pointer width is guaranteed to be 32 or 64,
        // the following process always succeeds.
        unsafe { Self::try_from(src).unwrap_unchecked() }
    }
}

/// ひらがな文字列をカタカナ文字列に変換する
///
/// ひらがなブロック（U+3041〜U+3096）と繰り返し記号（U+309D、U+309E）を
/// 対応するカタカナへコードポイントシフト（+0x60）で写します。
/// それ以外の文字はそのまま通します。
///
/// # 引数
///
/// * `src` - 変換元の文字列
///
/// # 戻り値
///
/// カタカナに変換された文字列
///
/// # 例
///
/// ```
/// # use yomidic::utils::hiragana_to_katakana;
/// assert_eq!(hiragana_to_katakana("かな"), "カナ");
/// assert_eq!(hiragana_to_katakana("かな漢字"), "カナ漢字");
/// ```
pub fn hiragana_to_katakana(src: &str) -> String {
    src.chars()
        .map(|c| match u32::from(c) {
            cp @ (0x3041..=0x3096 | 0x309D..=0x309E) => {
                // The shifted codepoint always lands inside the katakana block.
                char::from_u32(cp + 0x60).unwrap()
            }
            _ => c,
        })
        .collect()
}
