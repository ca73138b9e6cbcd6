//! システム辞書のビルダー
//!
//! このモジュールは、語彙トークンの集合からシステム辞書のバイナリイメージを
//! 構築するビルダーを提供します。ビルドは次のパスを順に実行します:
//!
//! 1. トークンを読みで安定ソートして[`KeyInfo`]列に畳み込む
//! 2. 高頻度品詞（最大255個）を選んで密なIDを割り当てる
//! 3. 値トライとキートライを構築してIDを記録する
//! 4. 各キー内のトークンを整列し、コスト・品詞・値の符号化種別を分類する
//! 5. キートライIDの逆引き順でトークン配列を構築する
//! 6. 4つの名前付きセクションを連結して書き出す
//!
//! 後段のパスは前段のパスが割り当てたIDに依存するため、順序は固定です。

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use hashbrown::HashSet;

use crate::dictionary::codec::{SystemCodec, SystemDictionaryCodec};
use crate::dictionary::file::{
    DefaultDictionaryFileCodec, DictionaryFileCodec, DictionaryFileSection,
};
use crate::dictionary::words_info::{CostType, KeyInfo, KeyInfoList, PosType, TokenInfo, ValueType};
use crate::errors::{Result, YomidicError};
use crate::storage::{BitVectorBasedArrayBuilder, LoudsTrieBuilder};
use crate::token::Token;
use crate::utils::{self, FromU32};

/// 高頻度品詞テーブルのエントリ数上限
///
/// トークンコーデックが密なIDを1バイトで格納するための制約です。
const MAX_FREQUENT_POS: u32 = 255;

/// 高頻度品詞セクションのスロット数
const FREQUENT_POS_SLOTS: usize = 256;

static DEFAULT_CODEC: SystemCodec = SystemCodec;
static DEFAULT_FILE_CODEC: DefaultDictionaryFileCodec = DefaultDictionaryFileCodec;

/// ビルダーの設定
///
/// 元実装のプロセス全体のフラグに相当するものを、明示的な設定値として
/// ビルダーに渡します。
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// trueの場合、各セクションを個別のデバッグファイルにも書き出します。
    pub preserve_intermediate_dictionary: bool,

    /// コストの小型符号化を許可する最小キー長（文字数）
    pub min_key_length_to_use_small_cost_encoding: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            preserve_intermediate_dictionary: false,
            min_key_length_to_use_small_cost_encoding: 6,
        }
    }
}

/// システム辞書のビルダー
///
/// トークン列を借用して1回のビルドを実行します。コーデックは借用する
/// だけで所有しません。
pub struct SystemDictionaryBuilder<'a, C = SystemCodec, F = DefaultDictionaryFileCodec> {
    value_trie_builder: LoudsTrieBuilder,
    key_trie_builder: LoudsTrieBuilder,
    token_array_builder: BitVectorBasedArrayBuilder,
    frequent_pos: BTreeMap<u32, u8>,
    codec: &'a C,
    file_codec: &'a F,
    config: BuilderConfig,
}

impl SystemDictionaryBuilder<'static> {
    /// 既定のコーデックを使用するビルダーを作成します。
    ///
    /// # 引数
    ///
    /// * `config` - ビルダーの設定
    pub fn new(config: BuilderConfig) -> Self {
        Self::with_codecs(&DEFAULT_CODEC, &DEFAULT_FILE_CODEC, config)
    }
}

impl<'a, C, F> SystemDictionaryBuilder<'a, C, F>
where
    C: SystemDictionaryCodec,
    F: DictionaryFileCodec,
{
    /// コーデックを指定してビルダーを作成します。
    ///
    /// # 引数
    ///
    /// * `codec` - システム辞書コーデック（ビルダーより長生きすること）
    /// * `file_codec` - ファイルコーデック（同上）
    /// * `config` - ビルダーの設定
    pub fn with_codecs(codec: &'a C, file_codec: &'a F, config: BuilderConfig) -> Self {
        Self {
            value_trie_builder: LoudsTrieBuilder::new(),
            key_trie_builder: LoudsTrieBuilder::new(),
            token_array_builder: BitVectorBasedArrayBuilder::new(),
            frequent_pos: BTreeMap::new(),
            codec,
            file_codec,
            config,
        }
    }

    /// トークン列から辞書イメージの内部構造を構築します。
    ///
    /// # 引数
    ///
    /// * `tokens` - 入力トークン列（キーと値は非空であること）
    ///
    /// # エラー
    ///
    /// 入力が不正な場合、または内部の不変条件が破られた場合に
    /// エラーを返します。
    pub fn build_from_tokens(&mut self, tokens: &[Token]) -> Result<()> {
        let mut key_info_list = self.read_tokens(tokens)?;

        self.build_frequent_pos(&key_info_list)?;
        self.build_value_trie(&key_info_list)?;
        self.build_key_trie(&key_info_list)?;

        self.set_id_for_value(&mut key_info_list)?;
        self.set_id_for_key(&mut key_info_list)?;
        self.sort_token_info(&mut key_info_list);
        self.set_cost_type(&mut key_info_list);
        self.set_pos_type(&mut key_info_list);
        self.set_value_type(&mut key_info_list);

        self.build_token_array(&key_info_list)
    }

    /// 辞書イメージをファイルに書き出します。
    ///
    /// 設定で中間ファイルの保存が有効な場合、出力パスを基底として
    /// `.value`、`.key`、`.tokens`、`.freq_pos`も書き出します。
    ///
    /// # 引数
    ///
    /// * `output` - 出力ファイルのパス
    ///
    /// # エラー
    ///
    /// ファイルの作成や書き込みに失敗した場合にエラーを返します。
    pub fn write_to_file<P>(&self, output: P) -> Result<()>
    where
        P: AsRef<Path>,
    {
        let output = output.as_ref();
        let wtr = BufWriter::new(File::create(output)?);
        self.write_to_stream(Some(output), wtr)
    }

    /// 辞書イメージをストリームに書き出します。
    ///
    /// # 引数
    ///
    /// * `intermediate_base` - 中間ファイルの基底パス（設定で有効な場合のみ使用）
    /// * `wtr` - 出力先
    ///
    /// # エラー
    ///
    /// 書き込みに失敗した場合にエラーを返します。
    pub fn write_to_stream<W>(&self, intermediate_base: Option<&Path>, wtr: W) -> Result<()>
    where
        W: Write,
    {
        let frequent_pos_image = self.frequent_pos_image();
        let sections = [
            DictionaryFileSection::new(
                self.file_codec
                    .section_name(self.codec.section_name_for_value()),
                self.value_trie_builder.image()?,
            ),
            DictionaryFileSection::new(
                self.file_codec
                    .section_name(self.codec.section_name_for_key()),
                self.key_trie_builder.image()?,
            ),
            DictionaryFileSection::new(
                self.file_codec
                    .section_name(self.codec.section_name_for_tokens()),
                self.token_array_builder.image()?,
            ),
            DictionaryFileSection::new(
                self.file_codec
                    .section_name(self.codec.section_name_for_pos()),
                &frequent_pos_image,
            ),
        ];

        if self.config.preserve_intermediate_dictionary {
            if let Some(base) = intermediate_base {
                log::info!("Writing intermediate files.");
                for (section, suffix) in sections.iter().zip(["value", "key", "tokens", "freq_pos"])
                {
                    write_section_to_file(section, &intermediate_path(base, suffix))?;
                }
            }
        }

        log::info!("Start writing dictionary file.");
        self.file_codec.write_sections(&sections, wtr)?;
        log::info!("Start writing dictionary file... done.");
        Ok(())
    }

    /// トークンを検証し、読みで安定ソートしてKeyInfo列に畳み込む
    fn read_tokens<'t>(&self, tokens: &'t [Token]) -> Result<KeyInfoList<'t>> {
        let mut buffer: Vec<&Token> = Vec::with_capacity(tokens.len());
        for (row, token) in tokens.iter().enumerate() {
            if token.key.is_empty() {
                return Err(YomidicError::invalid_argument(
                    "tokens",
                    format!("empty key string in input: row {row}, value {:?}", token.value),
                ));
            }
            if token.value.is_empty() {
                return Err(YomidicError::invalid_argument(
                    "tokens",
                    format!("empty value string in input: row {row}, key {:?}", token.key),
                ));
            }
            buffer.push(token);
        }
        // The sort must be stable to preserve the input order of equal keys.
        buffer.sort_by(|lhs, rhs| lhs.key.cmp(&rhs.key));

        let mut key_info_list = KeyInfoList::new();
        for token in buffer {
            let starts_new_key = match key_info_list.last() {
                Some(key_info) => key_info.key != token.key,
                None => true,
            };
            if starts_new_key {
                key_info_list.push(KeyInfo::new(&token.key));
            }
            let mut token_info = TokenInfo::new(token);
            token_info.value_type = classify_value(token);
            key_info_list.last_mut().unwrap().tokens.push(token_info);
        }
        Ok(key_info_list)
    }

    /// 高頻度品詞を選んで密なIDを割り当てる
    ///
    /// 結合品詞を出現数で数え、出現数のヒストグラムを降順に辿りながら、
    /// 選択数が255を超えない限りバケットを丸ごと採用します。境界の
    /// バケットは丸ごと棄却されます（部分的な採用はしません）。
    fn build_frequent_pos(&mut self, key_info_list: &KeyInfoList) -> Result<()> {
        let mut pos_counts = BTreeMap::<u32, u32>::new();
        for key_info in key_info_list {
            for token_info in &key_info.tokens {
                *pos_counts
                    .entry(token_info.token.combined_pos())
                    .or_default() += 1;
            }
        }

        // Histogram of multiplicities: count -> how many pos have it.
        let mut histogram = BTreeMap::<u32, u32>::new();
        for &count in pos_counts.values() {
            *histogram.entry(count).or_default() += 1;
        }

        let mut num_frequent_pos = 0;
        let mut threshold = u32::MAX;
        for (&count, &num) in histogram.iter().rev() {
            if num_frequent_pos + num > MAX_FREQUENT_POS {
                break;
            }
            threshold = count;
            num_frequent_pos += num;
        }
        log::info!("number of frequent pos: {num_frequent_pos}");
        log::info!("frequent pos threshold: {threshold}");

        // Dense ids are assigned in ascending order of the combined pos so
        // that the selection is deterministic across runs.
        let mut dense_id = 0;
        let mut num_tokens = 0;
        for (&pos, &count) in &pos_counts {
            if count >= threshold {
                self.frequent_pos.insert(pos, u8::try_from(dense_id)?);
                dense_id += 1;
                num_tokens += count;
            }
        }
        if dense_id != num_frequent_pos {
            return Err(YomidicError::invalid_state(
                "build_frequent_pos",
                "inconsistent result to find frequent pos",
            ));
        }
        log::info!("{dense_id} high frequent pos have {num_tokens} tokens");
        Ok(())
    }

    /// 自明でない表層形を値トライに登録して構築する
    fn build_value_trie(&mut self, key_info_list: &KeyInfoList) -> Result<()> {
        for key_info in key_info_list {
            for token_info in &key_info.tokens {
                if matches!(
                    token_info.value_type,
                    ValueType::AsIsHiragana | ValueType::AsIsKatakana
                ) {
                    // These values are reconstructed from the key at read
                    // time and stored in the token array as flags only.
                    continue;
                }
                let encoded = self.codec.encode_value(&token_info.token.value);
                self.value_trie_builder.add(&encoded)?;
            }
        }
        self.value_trie_builder.build()
    }

    /// 各トークンに値トライのIDを記録する
    ///
    /// すべてのトークンについて問い合わせます。符号化した表層形がトライに
    /// 存在しないトークン（AS_IS系）のIDは`None`のままになります。
    fn set_id_for_value(&self, key_info_list: &mut KeyInfoList) -> Result<()> {
        for key_info in key_info_list.iter_mut() {
            for token_info in key_info.tokens.iter_mut() {
                let encoded = self.codec.encode_value(&token_info.token.value);
                token_info.id_in_value_trie = self.value_trie_builder.get_id(&encoded)?;
            }
        }
        Ok(())
    }

    /// 読みをキートライに登録して構築する
    fn build_key_trie(&mut self, key_info_list: &KeyInfoList) -> Result<()> {
        for key_info in key_info_list {
            let encoded = self.codec.encode_key(key_info.key);
            self.key_trie_builder.add(&encoded)?;
        }
        self.key_trie_builder.build()
    }

    /// 各KeyInfoにキートライのIDを記録する
    fn set_id_for_key(&self, key_info_list: &mut KeyInfoList) -> Result<()> {
        for key_info in key_info_list.iter_mut() {
            let encoded = self.codec.encode_key(key_info.key);
            let id = self.key_trie_builder.get_id(&encoded)?.ok_or_else(|| {
                YomidicError::invalid_state(
                    "set_id_for_key",
                    format!("key {:?} was not assigned an id by the key trie", key_info.key),
                )
            })?;
            key_info.id_in_key_trie = Some(id);
        }
        Ok(())
    }

    /// 各キー内のトークンを整列する
    ///
    /// 左右の品詞IDは降順、値トライのIDは昇順（未割り当ては先頭）、
    /// 属性は昇順です。品詞でまとめることでSAME_AS_PREV_POSの機会を
    /// 最大化し、品詞内を値ID昇順にすることで読み込み時の値トライの
    /// 局所性を高めます。
    fn sort_token_info(&self, key_info_list: &mut KeyInfoList) {
        for key_info in key_info_list.iter_mut() {
            key_info.tokens.sort_by(|lhs, rhs| {
                rhs.token
                    .lid
                    .cmp(&lhs.token.lid)
                    .then_with(|| rhs.token.rid.cmp(&lhs.token.rid))
                    .then_with(|| lhs.id_in_value_trie.cmp(&rhs.id_in_value_trie))
                    .then_with(|| lhs.token.attributes.cmp(&rhs.token.attributes))
            });
        }
    }

    /// コスト符号化の種別を分類する
    ///
    /// 同品詞の同音語を持たないキーに限り、設定された長さ以上のキーの
    /// 全トークンに小型符号化を許可します。SAME_AS_PREV_POSの付与より
    /// 前に実行されます（同音語判定は符号化前の品詞で行います）。
    fn set_cost_type(&self, key_info_list: &mut KeyInfoList) {
        for key_info in key_info_list.iter_mut() {
            if has_homonyms_in_same_pos(key_info) {
                continue;
            }
            let key_len = key_info.key.chars().count();
            if key_len >= self.config.min_key_length_to_use_small_cost_encoding {
                for token_info in key_info.tokens.iter_mut() {
                    token_info.cost_type = CostType::CanUseSmallEncoding;
                }
            }
        }
    }

    /// 品詞符号化の種別を分類する
    fn set_pos_type(&self, key_info_list: &mut KeyInfoList) {
        for key_info in key_info_list.iter_mut() {
            for i in 0..key_info.tokens.len() {
                let pos = key_info.tokens[i].token.combined_pos();
                if let Some(&dense_id) = self.frequent_pos.get(&pos) {
                    key_info.tokens[i].pos_type = PosType::FrequentPos;
                    key_info.tokens[i].id_in_frequent_pos_map = Some(dense_id);
                }
                if i >= 1 {
                    let prev_pos = key_info.tokens[i - 1].token.combined_pos();
                    if prev_pos == pos {
                        // FREQUENT_POS may be overwritten here.
                        key_info.tokens[i].pos_type = PosType::SameAsPrevPos;
                    }
                }
            }
        }
    }

    /// 表層形符号化の種別を分類する
    fn set_value_type(&self, key_info_list: &mut KeyInfoList) {
        for key_info in key_info_list.iter_mut() {
            for i in 1..key_info.tokens.len() {
                let prev_token = key_info.tokens[i - 1].token;
                let token_info = &mut key_info.tokens[i];
                if token_info.value_type != ValueType::AsIsHiragana
                    && token_info.value_type != ValueType::AsIsKatakana
                    && token_info.token.value == prev_token.value
                {
                    token_info.value_type = ValueType::SameAsPrevValue;
                }
            }
        }
    }

    /// キートライIDの逆引き順でトークン配列を構築する
    ///
    /// `id_in_key_trie`が`[0, N)`のちょうど1つずつであること（置換で
    /// あること）を前提とし、破れていればエラーを返します。
    fn build_token_array(&mut self, key_info_list: &KeyInfoList) -> Result<()> {
        let mut id_to_key_info: Vec<Option<&KeyInfo>> = vec![None; key_info_list.len()];
        for key_info in key_info_list {
            let id = key_info.id_in_key_trie.ok_or_else(|| {
                YomidicError::invalid_state(
                    "build_token_array",
                    format!("key {:?} has no key trie id", key_info.key),
                )
            })?;
            match id_to_key_info.get_mut(usize::from_u32(id)) {
                Some(slot) if slot.is_none() => *slot = Some(key_info),
                Some(_) => {
                    return Err(YomidicError::invalid_state(
                        "build_token_array",
                        format!("key trie id {id} is assigned twice"),
                    ));
                }
                None => {
                    return Err(YomidicError::invalid_state(
                        "build_token_array",
                        format!("key trie id {id} is out of range"),
                    ));
                }
            }
        }

        for slot in id_to_key_info {
            let key_info = slot.ok_or_else(|| {
                YomidicError::invalid_state(
                    "build_token_array",
                    "key trie ids do not form a permutation",
                )
            })?;
            let encoded = self.codec.encode_tokens(&key_info.tokens)?;
            self.token_array_builder.add(encoded)?;
        }
        self.token_array_builder
            .add(vec![self.codec.tokens_termination_flag()])?;
        self.token_array_builder.build()
    }

    /// 高頻度品詞セクションのイメージを生成する
    ///
    /// 256個のu32リトルエンディアン。密なID`d`のスロットに結合品詞が
    /// 入り、残りのスロットは0です。
    fn frequent_pos_image(&self) -> Vec<u8> {
        let mut slots = [0u32; FREQUENT_POS_SLOTS];
        for (&pos, &dense_id) in &self.frequent_pos {
            slots[usize::from(dense_id)] = pos;
        }
        let mut image = Vec::with_capacity(FREQUENT_POS_SLOTS * 4);
        for slot in slots {
            image.extend(slot.to_le_bytes());
        }
        image
    }
}

/// トークンの表層形の初期分類を決める
///
/// 値がキーと同一ならAS_IS_HIRAGANA、キーのカタカナ形と同一なら
/// AS_IS_KATAKANA、それ以外はDEFAULT_VALUEです。
fn classify_value(token: &Token) -> ValueType {
    if token.value == token.key {
        return ValueType::AsIsHiragana;
    }
    if token.value == utils::hiragana_to_katakana(&token.key) {
        return ValueType::AsIsKatakana;
    }
    ValueType::DefaultValue
}

/// キー内に同じ結合品詞のトークンが複数あるかどうかを判定する
fn has_homonyms_in_same_pos(key_info: &KeyInfo) -> bool {
    // Early exit path mainly for performance.
    if key_info.tokens.len() == 1 {
        return false;
    }
    let mut seen = HashSet::with_capacity(key_info.tokens.len());
    for token_info in &key_info.tokens {
        if !seen.insert(token_info.token.combined_pos()) {
            return true;
        }
    }
    false
}

/// 中間ファイルのパスを生成する
fn intermediate_path(base: &Path, suffix: &str) -> PathBuf {
    let mut os = base.as_os_str().to_os_string();
    os.push(".");
    os.push(suffix);
    PathBuf::from(os)
}

/// セクションのデータ本体をファイルに書き出す
fn write_section_to_file(section: &DictionaryFileSection, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(section.data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::codec::{DecodedPos, DecodedToken, DecodedValue};
    use crate::token::TokenAttributes;

    fn token(key: &str, value: &str, lid: u16, rid: u16, cost: i16) -> Token {
        Token::new(key, value, lid, rid, cost)
    }

    /// トークン配列の構築直前までのパスを実行して注釈済みのリストを返す
    fn annotate<'t>(
        builder: &mut SystemDictionaryBuilder<'static>,
        tokens: &'t [Token],
    ) -> KeyInfoList<'t> {
        let mut key_info_list = builder.read_tokens(tokens).unwrap();
        builder.build_frequent_pos(&key_info_list).unwrap();
        builder.build_value_trie(&key_info_list).unwrap();
        builder.build_key_trie(&key_info_list).unwrap();
        builder.set_id_for_value(&mut key_info_list).unwrap();
        builder.set_id_for_key(&mut key_info_list).unwrap();
        builder.sort_token_info(&mut key_info_list);
        builder.set_cost_type(&mut key_info_list);
        builder.set_pos_type(&mut key_info_list);
        builder.set_value_type(&mut key_info_list);
        key_info_list
    }

    #[test]
    fn test_single_hiragana_as_is() {
        let tokens = [token("あ", "あ", 1, 1, 0)];
        let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
        let key_info_list = annotate(&mut builder, &tokens);

        assert_eq!(key_info_list.len(), 1);
        assert_eq!(key_info_list[0].tokens.len(), 1);
        assert_eq!(
            key_info_list[0].tokens[0].value_type,
            ValueType::AsIsHiragana
        );
        assert_eq!(builder.value_trie_builder.num_keys(), 0);

        builder.build_token_array(&key_info_list).unwrap();
        assert_eq!(builder.token_array_builder.num_elements(), 2);
    }

    #[test]
    fn test_single_katakana_as_is() {
        let tokens = [token("か", "カ", 1, 1, 0)];
        let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
        let key_info_list = annotate(&mut builder, &tokens);

        assert_eq!(
            key_info_list[0].tokens[0].value_type,
            ValueType::AsIsKatakana
        );
        assert_eq!(builder.value_trie_builder.num_keys(), 0);
    }

    #[test]
    fn test_same_value_becomes_same_as_prev() {
        let tokens = [token("き", "木", 1, 1, 100), token("き", "木", 1, 1, 200)];
        let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
        let key_info_list = annotate(&mut builder, &tokens);

        assert_eq!(key_info_list.len(), 1);
        let infos = &key_info_list[0].tokens;
        assert_eq!(infos.len(), 2);
        // The sort is stable, so equal tokens keep the input order.
        assert_eq!(infos[0].token.cost, 100);
        assert_eq!(infos[0].value_type, ValueType::DefaultValue);
        assert_eq!(infos[1].value_type, ValueType::SameAsPrevValue);
        assert_eq!(infos[0].id_in_value_trie, Some(0));
        assert_eq!(infos[1].id_in_value_trie, Some(0));
        // Two tokens share the pos, so the small cost encoding is disabled.
        assert!(has_homonyms_in_same_pos(&key_info_list[0]));
        assert_eq!(infos[0].cost_type, CostType::Default);
        assert_eq!(infos[1].cost_type, CostType::Default);
    }

    #[test]
    fn test_homonyms_in_same_pos_disable_small_cost() {
        let tokens = [
            token("abcdef", "X", 5, 5, 0),
            token("abcdef", "Y", 5, 5, 0),
        ];
        let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
        let key_info_list = annotate(&mut builder, &tokens);

        for token_info in &key_info_list[0].tokens {
            assert_eq!(token_info.cost_type, CostType::Default);
        }
    }

    #[test]
    fn test_small_cost_requires_min_key_length() {
        let tokens = [token("abcdef", "X", 5, 5, 0)];

        let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
        let key_info_list = annotate(&mut builder, &tokens);
        assert_eq!(
            key_info_list[0].tokens[0].cost_type,
            CostType::CanUseSmallEncoding
        );

        let config = BuilderConfig {
            min_key_length_to_use_small_cost_encoding: 7,
            ..BuilderConfig::default()
        };
        let mut builder = SystemDictionaryBuilder::new(config);
        let key_info_list = annotate(&mut builder, &tokens);
        assert_eq!(key_info_list[0].tokens[0].cost_type, CostType::Default);
    }

    /// 相異なる品詞をそれぞれ同じ多重度で持つトークン列を生成する
    fn pos_grid(num_pos: u16, multiplicity: usize) -> Vec<Token> {
        let mut tokens = vec![];
        for p in 0..num_pos {
            let lid = p + 1;
            for i in 0..multiplicity {
                tokens.push(token(
                    &format!("かぎ{p}の{i}"),
                    &format!("値{p}の{i}"),
                    lid,
                    lid,
                    10,
                ));
            }
        }
        tokens
    }

    #[test]
    fn test_frequent_pos_rejects_boundary_bucket_whole() {
        // One pos with 1000 tokens and 300 pos with 10 tokens each: the
        // 10-bucket would push the count to 301, so it is rejected whole
        // and only the 1000-bucket survives.
        let mut tokens = pos_grid(300, 10);
        for i in 0..1000 {
            tokens.push(token(&format!("おおい{i}"), &format!("多い{i}"), 999, 999, 1));
        }
        let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
        let key_info_list = annotate(&mut builder, &tokens);

        assert_eq!(builder.frequent_pos.len(), 1);
        assert_eq!(builder.frequent_pos.get(&0x03E7_03E7), Some(&0));

        // Every token of the surviving pos is alone in its key, so none of
        // them is overridden to SAME_AS_PREV_POS.
        for key_info in &key_info_list {
            for token_info in &key_info.tokens {
                if token_info.token.combined_pos() == 0x03E7_03E7 {
                    assert_eq!(token_info.pos_type, PosType::FrequentPos);
                    assert_eq!(token_info.id_in_frequent_pos_map, Some(0));
                } else {
                    assert_eq!(token_info.pos_type, PosType::Default);
                    assert_eq!(token_info.id_in_frequent_pos_map, None);
                }
            }
        }
    }

    #[test]
    fn test_frequent_pos_admits_up_to_255() {
        let mut tokens = pos_grid(254, 10);
        for i in 0..1000 {
            tokens.push(token(&format!("おおい{i}"), &format!("多い{i}"), 999, 999, 1));
        }
        let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
        let _ = annotate(&mut builder, &tokens);

        assert_eq!(builder.frequent_pos.len(), 255);
        // Dense ids follow the ascending order of the combined pos.
        let mut prev = None;
        for (&pos, &dense_id) in &builder.frequent_pos {
            if let Some((prev_pos, prev_id)) = prev {
                assert!(pos > prev_pos);
                assert_eq!(dense_id, prev_id + 1);
            }
            prev = Some((pos, dense_id));
        }
    }

    #[test]
    fn test_key_trie_ids_form_permutation() {
        let tokens = [
            token("すもも", "李", 1, 1, 10),
            token("もも", "桃", 1, 1, 10),
            token("うち", "内", 2, 2, 10),
            token("うち", "家", 3, 3, 20),
        ];
        let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
        let key_info_list = annotate(&mut builder, &tokens);

        let mut ids: Vec<u32> = key_info_list
            .iter()
            .map(|key_info| key_info.id_in_key_trie.unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2]);

        // The key grouping is lexicographic and the kana byte coding is
        // order-preserving, so the ids follow the grouping order.
        let keys: Vec<&str> = key_info_list.iter().map(|key_info| key_info.key).collect();
        assert_eq!(keys, vec!["うち", "すもも", "もも"]);
        for (i, key_info) in key_info_list.iter().enumerate() {
            assert_eq!(key_info.id_in_key_trie, Some(i as u32));
        }
    }

    #[test]
    fn test_token_order_within_key() {
        let tokens = [
            token("かん", "感", 1, 2, 10),
            token("かん", "缶", 3, 3, 10),
            token("かん", "勘", 3, 1, 10),
            token("かん", "管", 1, 2, 20),
            token("かん", "巻", 1, 1, 10),
        ];
        let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
        let key_info_list = annotate(&mut builder, &tokens);

        let infos = &key_info_list[0].tokens;
        // Descending by lid, then rid; inside a pos ascending by value id.
        let pos_order: Vec<(u16, u16)> = infos
            .iter()
            .map(|info| (info.token.lid, info.token.rid))
            .collect();
        assert_eq!(pos_order, vec![(3, 3), (3, 1), (1, 2), (1, 2), (1, 1)]);

        for pair in infos.windows(2) {
            let ordering = pair[1]
                .token
                .lid
                .cmp(&pair[0].token.lid)
                .then_with(|| pair[1].token.rid.cmp(&pair[0].token.rid))
                .then_with(|| pair[0].id_in_value_trie.cmp(&pair[1].id_in_value_trie))
                .then_with(|| pair[0].token.attributes.cmp(&pair[1].token.attributes));
            assert_ne!(ordering, std::cmp::Ordering::Greater);
        }

        // The two (1, 2) homonyms share the pos, so the second one is
        // marked SAME_AS_PREV_POS.
        assert_eq!(infos[3].pos_type, PosType::SameAsPrevPos);
    }

    #[test]
    fn test_classification_implications() {
        let tokens = [
            token("こう", "校", 1, 1, 10),
            token("こう", "高", 1, 1, 20),
            token("こう", "工", 2, 2, 30),
            token("こう", "工", 2, 2, 40),
        ];
        let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
        let key_info_list = annotate(&mut builder, &tokens);

        for key_info in &key_info_list {
            for (i, token_info) in key_info.tokens.iter().enumerate() {
                if token_info.pos_type == PosType::SameAsPrevPos {
                    assert!(i >= 1);
                    assert_eq!(
                        key_info.tokens[i - 1].token.combined_pos(),
                        token_info.token.combined_pos()
                    );
                }
                if token_info.value_type == ValueType::SameAsPrevValue {
                    assert!(i >= 1);
                    assert_eq!(
                        key_info.tokens[i - 1].token.value,
                        token_info.token.value
                    );
                }
                if token_info.cost_type == CostType::CanUseSmallEncoding {
                    assert!(!has_homonyms_in_same_pos(key_info));
                    assert!(
                        key_info.key.chars().count()
                            >= builder.config.min_key_length_to_use_small_cost_encoding
                    );
                }
            }
        }
    }

    #[test]
    fn test_classifiers_are_idempotent() {
        let tokens = [
            token("とうきょうと", "東京都", 1, 1, 10),
            token("とうきょうと", "とうきょうと", 1, 1, 20),
            token("き", "木", 2, 2, 10),
            token("き", "気", 2, 2, 20),
        ];
        let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
        let mut key_info_list = annotate(&mut builder, &tokens);

        let snapshot: Vec<Vec<_>> = key_info_list
            .iter()
            .map(|key_info| {
                key_info
                    .tokens
                    .iter()
                    .map(|info| {
                        (
                            info.cost_type,
                            info.pos_type,
                            info.value_type,
                            info.id_in_frequent_pos_map,
                            info.id_in_value_trie,
                        )
                    })
                    .collect()
            })
            .collect();

        builder.set_cost_type(&mut key_info_list);
        builder.set_pos_type(&mut key_info_list);
        builder.set_value_type(&mut key_info_list);

        let after: Vec<Vec<_>> = key_info_list
            .iter()
            .map(|key_info| {
                key_info
                    .tokens
                    .iter()
                    .map(|info| {
                        (
                            info.cost_type,
                            info.pos_type,
                            info.value_type,
                            info.id_in_frequent_pos_map,
                            info.id_in_value_trie,
                        )
                    })
                    .collect()
            })
            .collect();
        assert_eq!(snapshot, after);
    }

    #[test]
    fn test_value_trie_ids_match_encoded_values() {
        let tokens = [
            token("やま", "山", 1, 1, 10),
            token("かわ", "川", 1, 1, 10),
            token("やまかわ", "山川", 1, 1, 10),
        ];
        let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
        let key_info_list = annotate(&mut builder, &tokens);

        for key_info in &key_info_list {
            for token_info in &key_info.tokens {
                if token_info.value_type == ValueType::DefaultValue {
                    let encoded = DEFAULT_CODEC.encode_value(&token_info.token.value);
                    assert_eq!(
                        token_info.id_in_value_trie,
                        builder.value_trie_builder.get_id(&encoded).unwrap()
                    );
                    assert!(token_info.id_in_value_trie.is_some());
                }
            }
        }
    }

    #[test]
    fn test_empty_key_or_value_rejected() {
        let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
        let result = builder.build_from_tokens(&[token("", "空", 1, 1, 0)]);
        assert!(result.is_err());

        let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
        let result = builder.build_from_tokens(&[token("そら", "", 1, 1, 0)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_build_with_no_tokens() {
        let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
        builder.build_from_tokens(&[]).unwrap();
        // Only the termination entry.
        assert_eq!(builder.token_array_builder.num_elements(), 1);
        let mut image = vec![];
        builder.write_to_stream(None, &mut image).unwrap();
        assert_eq!(&image[..4], b"YDIC");
    }

    #[test]
    fn test_deterministic_image() {
        let tokens = [
            token("とうきょう", "東京", 1, 1, 100),
            token("とうきょう", "トウキョウ", 1, 1, 200),
            token("おおさか", "大阪", 2, 2, 100),
            token("きょう", "京", 3, 3, 50),
            token("きょう", "今日", 1, 1, 10),
        ];
        let build = || {
            let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
            builder.build_from_tokens(&tokens).unwrap();
            let mut image = vec![];
            builder.write_to_stream(None, &mut image).unwrap();
            image
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_token_array_roundtrip() {
        let tokens = [
            token("とうきょう", "東京", 1, 1, 100),
            token("とうきょう", "トウキョウ", 1, 1, 200),
            token("き", "木", 2, 2, 10),
            token("き", "木", 3, 3, 20),
            token("ながいかぎです", "長い鍵です", 4, 4, 300),
        ];
        let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
        let key_info_list = annotate(&mut builder, &tokens);

        // Reverse maps for resolving the structural decode.
        let dense_to_pos: BTreeMap<u8, u32> = builder
            .frequent_pos
            .iter()
            .map(|(&pos, &dense_id)| (dense_id, pos))
            .collect();
        let id_to_value: BTreeMap<u32, &str> = tokens
            .iter()
            .filter_map(|t| {
                let encoded = DEFAULT_CODEC.encode_value(&t.value);
                builder
                    .value_trie_builder
                    .get_id(&encoded)
                    .unwrap()
                    .map(|id| (id, t.value.as_str()))
            })
            .collect();

        let mut recovered = vec![];
        for key_info in &key_info_list {
            let encoded = DEFAULT_CODEC.encode_tokens(&key_info.tokens).unwrap();
            let decoded = DEFAULT_CODEC.decode_tokens(&encoded).unwrap();
            assert_eq!(decoded.len(), key_info.tokens.len());

            let mut prev_pos = None;
            let mut prev_value: Option<String> = None;
            for entry in &decoded {
                let DecodedToken {
                    pos,
                    cost,
                    value,
                    attributes,
                } = *entry;
                let (lid, rid) = match pos {
                    DecodedPos::Explicit { lid, rid } => (lid, rid),
                    DecodedPos::FrequentPos(dense_id) => {
                        let combined = dense_to_pos[&dense_id];
                        ((combined >> 16) as u16, (combined & 0xFFFF) as u16)
                    }
                    DecodedPos::SameAsPrev => prev_pos.unwrap(),
                };
                let value = match value {
                    DecodedValue::TrieId(id) => id_to_value[&id].to_string(),
                    DecodedValue::AsIsHiragana => key_info.key.to_string(),
                    DecodedValue::AsIsKatakana => utils::hiragana_to_katakana(key_info.key),
                    DecodedValue::SameAsPrev => prev_value.clone().unwrap(),
                };
                prev_pos = Some((lid, rid));
                prev_value = Some(value.clone());
                recovered.push((key_info.key.to_string(), value, lid, rid, cost, attributes));
            }
        }

        let mut expected: Vec<_> = tokens
            .iter()
            .map(|t| {
                (
                    t.key.clone(),
                    t.value.clone(),
                    t.lid,
                    t.rid,
                    t.cost,
                    t.attributes,
                )
            })
            .collect();
        expected.sort();
        recovered.sort();
        assert_eq!(recovered, expected);
    }

    #[test]
    fn test_write_intermediate_files() {
        let tokens = [token("やま", "山", 1, 1, 10)];
        let config = BuilderConfig {
            preserve_intermediate_dictionary: true,
            ..BuilderConfig::default()
        };
        let mut builder = SystemDictionaryBuilder::new(config);
        builder.build_from_tokens(&tokens).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("system.dic");
        builder.write_to_file(&output).unwrap();

        assert!(output.exists());
        for suffix in ["value", "key", "tokens", "freq_pos"] {
            let path = intermediate_path(&output, suffix);
            assert!(path.exists(), "missing {}", path.display());
        }
        let pos_image = std::fs::read(intermediate_path(&output, "freq_pos")).unwrap();
        assert_eq!(pos_image.len(), FREQUENT_POS_SLOTS * 4);
    }

    #[test]
    fn test_frequent_pos_section_layout() {
        let tokens = [
            token("いち", "一", 7, 8, 10),
            token("に", "二", 7, 8, 10),
            token("さん", "三", 1, 2, 10),
        ];
        let mut builder = SystemDictionaryBuilder::new(BuilderConfig::default());
        builder.build_from_tokens(&tokens).unwrap();

        // Both buckets fit under the 255 limit, so both pos are selected;
        // dense ids follow the ascending combined pos order.
        assert_eq!(builder.frequent_pos.get(&0x0001_0002), Some(&0));
        assert_eq!(builder.frequent_pos.get(&0x0007_0008), Some(&1));

        let image = builder.frequent_pos_image();
        assert_eq!(image.len(), FREQUENT_POS_SLOTS * 4);
        assert_eq!(&image[..4], 0x0001_0002u32.to_le_bytes().as_slice());
        assert_eq!(&image[4..8], 0x0007_0008u32.to_le_bytes().as_slice());
        assert!(image[8..].iter().all(|&b| b == 0));
    }
}
