//! Prompt templates for the code classifier and the disclosure check.

use std::str::FromStr;

const QUESTION: &str = "Does this code implement an activity that displays the app's privacy policy \
when the user clicks on the privacy policy link in the Health Connect permissions screen?";

const EXPLAIN: &str = "If yes, explain the code that implements the activity.";

/// Known positive: a WebView loading the app's own privacy policy.
const POSITIVE_EXAMPLE: &str = r#"    @Override
    protected void onCreate(Bundle savedInstanceState) {
        super.onCreate(savedInstanceState);
        setContentView(f.f13399a);
        View findViewById = findViewById(e.f13398a);
        AbstractC1819s.h(findViewById, "findViewById(...)");
        WebView webView = (WebView) findViewById;
        webView.setWebViewClient(new WebViewClient());
        webView.getSettings().setJavaScriptEnabled(true);
        webView.loadUrl("https://trainwell.net/privacy-policy");
        webView.setWebViewClient(new a());
    }"#;

/// Known negative: a WebView loading generic platform documentation.
const NEGATIVE_EXAMPLE: &str = r#"    protected void onCreate(Bundle savedInstanceState) {
        super.onCreate(savedInstanceState);
        WebView webView = new WebView(this);
        webView.setWebViewClient(new a());
        webView.loadUrl("https://developer.android.com/health-and-fitness/guides/health-connect/develop/get-started");
        setContentView(webView);
    }"#;

/// How the code-classification prompt is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptStyle {
    /// Java code preceded by one positive and one negative worked example.
    #[default]
    FewShot,
    /// Java code plus the activity declaration from the app manifest.
    Manifest,
}

impl FromStr for PromptStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "few-shot" | "fewshot" => Ok(Self::FewShot),
            "manifest" => Ok(Self::Manifest),
            other => Err(format!("unknown prompt style '{other}' (expected few-shot or manifest)")),
        }
    }
}

pub fn few_shot(code: &str) -> String {
    format!(
        "Analyze the following Java code examples and answer these questions.\n\n\
         Example 1 (Positive Case):\n{POSITIVE_EXAMPLE}\n\
         1. {QUESTION}\nAnswer: Yes\n\
         2. {EXPLAIN}\nAnswer: This code implements the activity with a WebView that loads the privacy policy URL.\n\n\
         Example 2 (Negative Case):\n{NEGATIVE_EXAMPLE}\n\
         1. {QUESTION}\nAnswer: No\n\
         2. {EXPLAIN}\nAnswer: N/A\n\n\
         Now, analyze the following Java code:\n{code}\n\
         1. {QUESTION}\nAnswer: [Yes/No]\n\
         2. {EXPLAIN}\nAnswer: [Explanation]"
    )
}

/// Prompt pairing the manifest's declared activity with the Java code.
///
/// Runs of blank lines in the manifest excerpt are collapsed first.
pub fn with_manifest(code: &str, manifest: &str) -> String {
    let manifest = manifest.replace("\n\n", "\n");
    format!(
        "Analyze the following declared activity and the Java code and answer these questions:\n\
         1. {QUESTION} Answer: [Yes/No]\n\
         2. {EXPLAIN} Answer: [Explanation]\n\n\
         Declared activity in manifest: {manifest}\n\
         Java code:\n```\n{code}\n```"
    )
}

/// Ask whether one policy segment justifies one requested capability.
pub fn rationale(segment: &str, capability: &str) -> String {
    format!(
        "Read the following quoted text from the privacy policy. \
         Does the quoted text explicitly contain rationales specific for {capability}, that is, \
         clear explanations of why the app requests {capability} and how the {capability} \
         will be used or handled?\n\n\
         The quoted sentences are: {segment}\n\n\
         Please directly respond with '[Yes]' or '[No]', followed by the specific sentence(s) \
         from the text that support your answer."
    )
}
