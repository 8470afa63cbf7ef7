//! 提示词构建：初始 / 续接 / 恢复三种变体
//!
//! 全部为纯函数：相同输入得到相同输出，不读取任何隐藏状态。

/// 恢复提示词中保留的最近转录条数
pub const RECOVERY_TRANSCRIPT_WINDOW: usize = 15;
/// 恢复提示词中保留的最近动作条数
pub const RECOVERY_ACTION_WINDOW: usize = 5;

const RULE: &str = "═══════════════════════════════════════════════════════════════════════";

/// 内置初始提示词模板（占位符：{intent} {url} {box_id}；字面花括号写作 {{ }}）
pub const DEFAULT_TEMPLATE: &str = r#"You are an autonomous intelligent agent tasked with completing web-based tasks.
You are working on FAKE TESTING WEBSITES - clones designed to test AI agents.

═══════════════════════════════════════════════════════════════════════
YOUR TASK:
═══════════════════════════════════════════════════════════════════════

OBJECTIVE: {intent}
CURRENT URL: {url}

ONLY use the test websites. NEVER navigate to real websites.

═══════════════════════════════════════════════════════════════════════
AVAILABLE TOOLS (all require boxId='{box_id}'):
═══════════════════════════════════════════════════════════════════════

- screenshot(boxId): Capture current screen state
- click(boxId, target): Click on element (describe the element precisely)
- hover(boxId, target): Hover to reveal dropdowns; explore nested menus before clicking
- type(boxId, content, pressEnterAfterType): Type text into focused field
- scroll(boxId, direction, distance): Scroll the page
- press_key(boxId, keys): Press keyboard keys
- wait(boxId, duration): Wait for specified milliseconds
- list_tabs(boxId): List all open browser tabs
- switch_tab(boxId, tabId): Switch tab (ALWAYS list_tabs first)
- close_tab(boxId, tabId): Close a tab (NEVER close the CDP page)

═══════════════════════════════════════════════════════════════════════
SESSION RULES:
═══════════════════════════════════════════════════════════════════════

- The environment ALREADY has an active browser session. Reuse boxId='{box_id}'.
- NEVER start a new browser box or open new windows.
- Do NOT make direct network requests from the shell; they are unauthenticated.
- The local file system is not the machine you are operating on.
- Always continue from the CURRENT PAGE. Take a screenshot if unsure where you are.

═══════════════════════════════════════════════════════════════════════
WORKFLOW:
═══════════════════════════════════════════════════════════════════════

1. Call list_tabs, then take a screenshot to see the current state
2. Think step-by-step and execute actions one at a time
3. Verify with screenshots after important actions
4. If multiple records match, aggregate them instead of picking one
5. Copy literal values (addresses, prices, names) verbatim from the UI
6. If a numeric count has no matches, answer "0"; if the task is impossible, answer "N/A"

═══════════════════════════════════════════════════════════════════════
FINALIZATION (MANDATORY):
═══════════════════════════════════════════════════════════════════════

You MUST call mcp__task-completion__complete_task({{"finalAnswer": "..."}}) once you know the answer.
Saying "the task is complete" in text does NOT count - only the tool call is evaluated."#;

/// 构建提示词所需的任务上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptContext<'a> {
    pub intent: &'a str,
    /// 当前位置（URL），未知时为 "unknown"
    pub url: &'a str,
    pub box_id: &'a str,
    pub step: u32,
}

/// 渲染模板：{intent} {url} {box_id} 替换为上下文值，{{ / }} 还原为字面花括号，其余原样保留
pub fn render_template(template: &str, ctx: &PromptContext<'_>) -> String {
    let mut out = String::with_capacity(template.len() + ctx.intent.len());
    let mut rest = template;
    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
        } else if let Some((value, len)) = placeholder(tail, ctx) {
            out.push_str(value);
            rest = &tail[len..];
        } else {
            out.push_str(&tail[..1]);
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

fn placeholder<'a>(tail: &str, ctx: &PromptContext<'a>) -> Option<(&'a str, usize)> {
    [
        ("{intent}", ctx.intent),
        ("{url}", ctx.url),
        ("{box_id}", ctx.box_id),
    ]
    .into_iter()
    .find(|(key, _)| tail.starts_with(key))
    .map(|(key, value)| (value, key.len()))
}

/// 初始提示词（step = 1）
pub fn initial_prompt(template: &str, ctx: &PromptContext<'_>) -> String {
    render_template(template, ctx).trim().to_string()
}

/// 续接提示词（step > 1）：会话续接已带上历史，只给目标、位置与步数
pub fn continuation_prompt(ctx: &PromptContext<'_>) -> String {
    format!(
        "Continue task (step {}). Goal: {}\nCurrent URL: {}",
        ctx.step, ctx.intent, ctx.url
    )
}

/// 恢复提示词：媒体错误后新开会话时使用，带上最近 15 条转录与最近 5 条动作
pub fn recovery_prompt(
    ctx: &PromptContext<'_>,
    transcript: &[String],
    action_history: &[String],
) -> String {
    let recent_transcript = tail(transcript, RECOVERY_TRANSCRIPT_WINDOW)
        .iter()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    let recent_actions = tail(action_history, RECOVERY_ACTION_WINDOW)
        .iter()
        .map(|action| format!("  - {action}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut sections = vec![
        format!(
            "{RULE}\nRECOVERING FROM TECHNICAL ERROR\n{RULE}\n\n\
             You encountered a temporary image processing error. The browser session is\n\
             still active and ready to continue. Here's what happened:"
        ),
        format!("{RULE}\nYOUR TASK (unchanged):\n{RULE}\n\nOBJECTIVE: {}", ctx.intent),
        format!(
            "{RULE}\nCURRENT STATE:\n{RULE}\n\n\
             - Box ID: {}\n- Current URL: {}\n- Step: {}\n\
             - Browser: ALREADY OPEN (do not start a new browser)",
            ctx.box_id, ctx.url, ctx.step
        ),
        format!(
            "{RULE}\nWHAT YOU DID BEFORE THE ERROR (last {RECOVERY_TRANSCRIPT_WINDOW} messages):\n{RULE}\n\n{recent_transcript}"
        ),
    ];
    if !recent_actions.is_empty() {
        sections.push(format!("{RULE}\nACTIONS TAKEN:\n{RULE}\n\n{recent_actions}"));
    }
    sections.push(format!(
        "{RULE}\nCRITICAL RECOVERY INSTRUCTIONS:\n{RULE}\n\n\
         1. DO NOT start a new browser box (the browser already exists)\n\
         2. DO NOT ask for permissions (you already have them)\n\
         3. DO take a screenshot FIRST to see the current page state\n\
         4. DO continue from where you left off based on the transcript above\n\
         5. The page was just refreshed, so you may need to re-navigate"
    ));
    sections.push(format!(
        "{RULE}\nREMEMBER TO CALL complete_task() WHEN DONE\n{RULE}\n\n\
         You MUST call complete_task(finalAnswer=\"your answer\") to finish the task.\n\n\
         START BY TAKING A SCREENSHOT to see the current state, then continue\n\
         working on the task: {}",
        ctx.intent
    ));
    sections.join("\n\n")
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}
