//! 视觉服务提示词

/// 导航模式: 单一目标 (`{target_object}` 在运行时替换)
pub const DETECTION_NAVIGATION: &str = r#"
Detect and return the bounding box of {target_object} in the image.
The output format must be strictly JSON:
[{"box_2d": [y_min, x_min, y_max, x_max], "label": "{target_object} [context]"}]
Coordinates must be normalized to a 0-1000 range.
If no {target_object} is detected, return an empty list [].
CRITICAL: Include a brief 2-3 word context in brackets describing where it is (e.g., "Phone [on table]", "Keys [in hand]").
"#;

pub const DETECTION_MULTI_OBJECT: &str = r#"
Return bounding boxes as a JSON array with labels for PHYSICAL 3D OBJECTS only.
DO NOT detect text, numbers, UI elements, or content on screens.
Focus on real-world objects like: person, phone, cup, laptop, keyboard, mouse,
pen, bottle, book, bag, etc.

CRITICAL:
- Use DESCRIPTIVE labels (e.g., "Red Cup", "Black Phone", "Wooden Table").
- NEVER use generic labels like "Object", "Item", "Thing", or "Object 1".
- If you don't know the specific name, describe its visual appearance (e.g., "Blue Box").
- ALWAYS include a brief 2-3 word context in brackets describing where the object is.
  Example: "Black Phone [on white desk]", "Red Cup [in hand]", "Cat [on sofa]".

Limit to 10 objects.
The format should be as follows: [{"box_2d": [ymin, xmin, ymax, xmax],
"label": <descriptive label>}] normalized to 0-1000. The values in
box_2d must only be integers.
"#;

pub const DETECTION_OBSTACLE: &str = r#"
Detect potential obstacles in the image (objects in the path of movement).
Prioritize: walls, furniture, people, doors, stairs, curbs.
Return JSON: [{"box_2d": [y_min, x_min, y_max, x_max], "label": "...", "distance_estimate": "close/medium/far"}]
Coordinates must be normalized to a 0-1000 range.
"#;

pub const SCENE_DESCRIPTION: &str = r#"
Describe this scene naturally and helpfully.
Include:
1. Main objects and their positions (left, right, center, ahead)
2. People and their activities
3. Spatial layout and navigation hints
4. Potential obstacles or hazards

Be concise but informative. Use simple directional language.
Speak naturally as if describing to a friend.

CRITICAL: Do NOT use markdown formatting, asterisks, bold (**), italics, brackets, or any special characters.
Just use plain, natural sentences. This will be spoken by text-to-speech.
"#;

/// 视觉问答前缀 (问题追加在后面)
pub const VISUAL_QUESTION: &str = "You are seeing through a live camera. Answer briefly and plainly, \
without markdown, as if speaking to the person wearing the camera.\nQuestion: ";
