use serde::{Deserialize, Serialize};
use std::fmt;

/// 行動アラート
///
/// ラベル文字列は表示側がそのまま使うため固定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Alert {
    /// 腕を水平に伸ばしている（武器を構える姿勢）
    #[serde(rename = "Braco Estendido (Agressao)")]
    Aiming,
    /// 両手を上げる / 頭の後ろで組む
    #[serde(rename = "Rendicao")]
    Surrender,
    /// 手を胴体の前に隠している
    #[serde(rename = "Mao Oculta")]
    HiddenHand,
}

impl Alert {
    pub const ALL: [Alert; 3] = [Alert::Aiming, Alert::Surrender, Alert::HiddenHand];

    pub fn label(&self) -> &'static str {
        match self {
            Alert::Aiming => "Braco Estendido (Agressao)",
            Alert::Surrender => "Rendicao",
            Alert::HiddenHand => "Mao Oculta",
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 1トラック・1フレーム分のアクティブなアラート
///
/// 挿入順は Aiming → Surrender → HiddenHand の評価順。重複は持たない。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertSet(Vec<Alert>);

impl AlertSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, alert: Alert) {
        if !self.contains(alert) {
            self.0.push(alert);
        }
    }

    pub fn contains(&self, alert: Alert) -> bool {
        self.0.contains(&alert)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Alert> + '_ {
        self.0.iter().copied()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.0.iter().map(Alert::label).collect()
    }

    /// 順序を無視した比較
    pub fn same_alerts(&self, other: &AlertSet) -> bool {
        self.len() == other.len() && self.iter().all(|a| other.contains(a))
    }
}

impl FromIterator<Alert> for AlertSet {
    fn from_iter<I: IntoIterator<Item = Alert>>(iter: I) -> Self {
        let mut set = AlertSet::new();
        for alert in iter {
            set.insert(alert);
        }
        set
    }
}
